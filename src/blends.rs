//! Blended model configurations
//!
//! A blend is a named set of models that is compared as a group, e.g.
//! "fast-tier" = gpt-4o-mini + claude-3-5-haiku + gemini-1.5-flash.

use crate::models::{BlendedModel, SelectedModel};
use crate::storage::{JsonStore, BLENDS_KEY};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

pub struct BlendStore {
    store: JsonStore,
}

impl BlendStore {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<BlendedModel>> {
        self.store
            .get_or_default(BLENDS_KEY)
            .context("Failed to read blended models")
    }

    /// Lookup is case-insensitive.
    pub fn get(&self, name: &str) -> Result<Option<BlendedModel>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|b| b.name.eq_ignore_ascii_case(name)))
    }

    pub fn add(&self, name: &str, description: Option<String>, models: Vec<SelectedModel>) -> Result<BlendedModel> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Blend name cannot be empty");
        }
        if models.is_empty() {
            anyhow::bail!("A blend needs at least one model");
        }

        let mut blends = self.list()?;
        if blends.iter().any(|b| b.name.eq_ignore_ascii_case(name)) {
            anyhow::bail!("A blend named '{}' already exists", name);
        }

        let mut unique: Vec<SelectedModel> = Vec::with_capacity(models.len());
        for model in models {
            if !unique.contains(&model) {
                unique.push(model);
            }
        }

        let blend = BlendedModel {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            models: unique,
            created_at: Utc::now(),
        };
        blends.push(blend.clone());
        self.store
            .set(BLENDS_KEY, &blends)
            .context("Failed to write blended models")?;

        info!(blend = %blend.name, models = blend.models.len(), "Blend created");
        Ok(blend)
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut blends = self.list()?;
        let before = blends.len();
        blends.retain(|b| !b.name.eq_ignore_ascii_case(name));
        if blends.len() == before {
            return Ok(false);
        }
        self.store
            .set(BLENDS_KEY, &blends)
            .context("Failed to write blended models")?;
        Ok(true)
    }
}
