use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use collect_core::ResearchSpecification;

use crate::error::Result;

/// Where saved research specifications come from.
#[async_trait]
pub trait SpecificationSource: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ResearchSpecification>>;

    async fn list(&self) -> Result<Vec<ResearchSpecification>>;
}

/// Specifications held in memory, loaded from configuration.
#[derive(Debug, Default)]
pub struct InMemorySpecifications {
    specifications: RwLock<HashMap<String, ResearchSpecification>>,
}

impl InMemorySpecifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, specification: ResearchSpecification) {
        self.specifications
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(specification.id.clone(), specification);
    }
}

impl FromIterator<ResearchSpecification> for InMemorySpecifications {
    fn from_iter<I: IntoIterator<Item = ResearchSpecification>>(iter: I) -> Self {
        let source = Self::new();
        for specification in iter {
            source.insert(specification);
        }
        source
    }
}

#[async_trait]
impl SpecificationSource for InMemorySpecifications {
    async fn get(&self, id: &str) -> Result<Option<ResearchSpecification>> {
        Ok(self
            .specifications
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<ResearchSpecification>> {
        let mut all: Vec<_> = self
            .specifications
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}
