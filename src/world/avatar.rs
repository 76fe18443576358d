//! Base avatar model and its load lifecycle

use crate::assets::{LoadError, LoadResult, LoadState};
use crate::composition::CompositionError;
use crate::rendering::scene::SceneGraph;
use crate::utils::math::Transform;
use tracing::{debug, info, warn};

/// Load phase of the base avatar model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvatarPhase {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

impl std::fmt::Display for AvatarPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvatarPhase::NotLoaded => write!(f, "NotLoaded"),
            AvatarPhase::Loading => write!(f, "Loading"),
            AvatarPhase::Loaded => write!(f, "Loaded"),
            AvatarPhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug)]
pub enum AvatarOutcome {
    Loaded,
    Failed(CompositionError),
    Stale,
}

/// Owns the avatar scene once it has loaded. Until then (or after a failed
/// load) there is no scene at all, never a partial one.
#[derive(Debug)]
pub struct AvatarModel {
    uri: String,
    placement: Transform,
    phase: AvatarPhase,
    attempt: u64,
    error: Option<LoadError>,
    scene: Option<SceneGraph>,
    transition_count: u64,
}

impl AvatarModel {
    /// `placement` is applied to the scene root when the model arrives
    pub fn new(uri: impl Into<String>, placement: Transform) -> Self {
        Self {
            uri: uri.into(),
            placement,
            phase: AvatarPhase::NotLoaded,
            attempt: 0,
            error: None,
            scene: None,
            transition_count: 0,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn phase(&self) -> AvatarPhase {
        self.phase
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn scene(&self) -> Option<&SceneGraph> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut SceneGraph> {
        self.scene.as_mut()
    }

    pub fn error(&self) -> Option<CompositionError> {
        self.error.as_ref().map(|e| self.failure(e))
    }

    pub fn load_state(&self) -> LoadState {
        match self.phase {
            AvatarPhase::NotLoaded => LoadState::NotLoaded,
            AvatarPhase::Loading => LoadState::Loading,
            AvatarPhase::Loaded => LoadState::Loaded,
            AvatarPhase::Failed => LoadState::Failed(
                self.error.as_ref().map(ToString::to_string).unwrap_or_default(),
            ),
        }
    }

    pub fn can_transition_to(&self, next: AvatarPhase) -> bool {
        use AvatarPhase::*;

        matches!(
            (self.phase, next),
            (NotLoaded, Loading) | (Loading, Loaded) | (Loading, Failed) | (Failed, Loading)
        )
    }

    fn transition_to(&mut self, next: AvatarPhase) -> bool {
        if !self.can_transition_to(next) {
            debug!("Ignoring avatar transition {} -> {}", self.phase, next);
            return false;
        }
        debug!("Avatar transition: {} -> {}", self.phase, next);
        self.phase = next;
        self.transition_count += 1;
        true
    }

    /// Enter `Loading`. Returns the attempt to tag the load with, or `None`
    /// when a load is running or the model is already loaded.
    pub fn begin(&mut self) -> Option<u64> {
        if !self.transition_to(AvatarPhase::Loading) {
            return None;
        }
        self.attempt += 1;
        self.error = None;
        info!("Loading avatar {} (attempt {})", self.uri, self.attempt);
        Some(self.attempt)
    }

    pub fn complete(&mut self, attempt: u64, result: LoadResult) -> AvatarOutcome {
        if self.phase != AvatarPhase::Loading || attempt != self.attempt {
            warn!("Ignoring stale avatar load attempt {}", attempt);
            return AvatarOutcome::Stale;
        }

        match result {
            Ok(mut scene) => {
                let root = scene.root();
                scene.set_transform(root, self.placement);
                info!("Avatar {} loaded ({} nodes)", self.uri, scene.node_count());
                self.scene = Some(scene);
                self.transition_to(AvatarPhase::Loaded);
                AvatarOutcome::Loaded
            }
            Err(error) => {
                warn!("Avatar {} failed to load: {}", self.uri, error);
                let failure = self.failure(&error);
                self.error = Some(error);
                self.transition_to(AvatarPhase::Failed);
                AvatarOutcome::Failed(failure)
            }
        }
    }

    fn failure(&self, error: &LoadError) -> CompositionError {
        CompositionError::BaseModelLoadFailure {
            uri: self.uri.clone(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn avatar() -> AvatarModel {
        AvatarModel::new(
            "https://models.example/avatar.glb",
            Transform::from_translation(Vec3::new(0.0, -1.0, 0.0)).with_uniform_scale(1.5),
        )
    }

    fn network_error() -> LoadError {
        LoadError::Http {
            url: "https://models.example/avatar.glb".into(),
            reason: "503".into(),
        }
    }

    #[test]
    fn test_initial_state() {
        let model = avatar();
        assert_eq!(model.phase(), AvatarPhase::NotLoaded);
        assert_eq!(model.load_state(), LoadState::NotLoaded);
        assert!(model.scene().is_none());
        assert_eq!(model.transition_count(), 0);
    }

    #[test]
    fn test_successful_load_applies_placement() {
        let mut model = avatar();
        let attempt = model.begin().unwrap();
        assert!(model.begin().is_none());

        assert!(matches!(
            model.complete(attempt, Ok(SceneGraph::new("avatar"))),
            AvatarOutcome::Loaded
        ));
        let scene = model.scene().unwrap();
        let root = scene.node(scene.root()).unwrap();
        assert_eq!(root.transform.translation, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(root.transform.scale, Vec3::splat(1.5));

        // loaded exactly once
        assert!(model.begin().is_none());
    }

    #[test]
    fn test_failure_keeps_no_scene_and_can_retry() {
        let mut model = avatar();
        let attempt = model.begin().unwrap();

        let outcome = model.complete(attempt, Err(network_error()));
        assert!(matches!(outcome, AvatarOutcome::Failed(CompositionError::BaseModelLoadFailure { .. })));
        assert!(model.scene().is_none());
        assert!(model.load_state().is_failed());
        assert!(model.error().is_some());

        let retry = model.begin().unwrap();
        assert!(retry > attempt);
        assert_eq!(model.phase(), AvatarPhase::Loading);
        assert!(model.error().is_none());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut model = avatar();
        let attempt = model.begin().unwrap();
        assert!(matches!(
            model.complete(attempt + 1, Ok(SceneGraph::new("avatar"))),
            AvatarOutcome::Stale
        ));
        assert_eq!(model.phase(), AvatarPhase::Loading);
    }

    #[test]
    fn test_invalid_transitions() {
        let model = avatar();
        assert!(!model.can_transition_to(AvatarPhase::Loaded));
        assert!(!model.can_transition_to(AvatarPhase::Failed));
        assert!(model.can_transition_to(AvatarPhase::Loading));
    }
}
