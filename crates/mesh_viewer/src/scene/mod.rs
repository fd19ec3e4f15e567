//! Scene graph collaborator
//!
//! Owns the loaded models. The renderer never stores models itself; it keys
//! its per-model GPU resources by the same [`ModelKey`] the scene hands out.

mod model;
mod obj_loader;

pub use model::{Model, Shape};
pub use obj_loader::load_obj;

use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

new_key_type! {
    /// Stable key for a model in the [`Scene`]
    pub struct ModelKey;
}

/// Scene loading errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// The OBJ file could not be read or parsed
    #[error("failed to load {path}: {source}")]
    Obj {
        /// File that failed to load
        path: String,
        /// Underlying loader error
        #[source]
        source: tobj::LoadError,
    },

    /// The file parsed but holds no geometry
    #[error("{0} contains no triangles")]
    Empty(String),
}

/// Ordered collection of models
#[derive(Debug, Default)]
pub struct Scene {
    models: SlotMap<ModelKey, Model>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a model and return its key
    pub fn add(&mut self, model: Model) -> ModelKey {
        let name = model.name.clone();
        let key = self.models.insert(model);
        log::info!("[scene] Added model '{}' as {:?}", name, key);
        key
    }

    /// Remove a model, returning it if it was present
    pub fn remove(&mut self, key: ModelKey) -> Option<Model> {
        self.models.remove(key)
    }

    /// Look up a model
    pub fn get(&self, key: ModelKey) -> Option<&Model> {
        self.models.get(key)
    }

    /// Look up a model mutably
    pub fn get_mut(&mut self, key: ModelKey) -> Option<&mut Model> {
        self.models.get_mut(key)
    }

    /// Iterate models in draw order
    pub fn iter(&self) -> impl Iterator<Item = (ModelKey, &Model)> {
        self.models.iter()
    }

    /// Keys of every model
    pub fn keys(&self) -> Vec<ModelKey> {
        self.models.keys().collect()
    }

    /// Number of models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the scene is empty
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_key_is_not_reused_for_lookup() {
        let mut scene = Scene::new();
        let first = scene.add(Model::new("a"));
        assert!(scene.remove(first).is_some());

        let second = scene.add(Model::new("b"));
        assert_ne!(first, second);
        assert!(scene.get(first).is_none());
        assert_eq!(scene.get(second).map(|m| m.name.as_str()), Some("b"));
        assert_eq!(scene.len(), 1);
    }
}
