//! Composition engine
//!
//! Owns the selection, the avatar and every attachment, and is the only
//! place the avatar scene is mutated. Loads run on the tokio runtime; their
//! results are applied when the host drains them with
//! [`CompositionEngine::process_completions`] or awaits
//! [`CompositionEngine::next_completion`].

use super::attachment::{AttachedGarment, AttachmentManager};
use super::embedded::{ClothingMarkers, CompositorReport, EmbeddedCompositor, MatchPolicy};
use super::{CompositionError, CompositionResult};
use crate::assets::{
    AssetLoadCache, AssetManager, CacheStats, CompletionOutcome, EnsureOutcome, LoadCompletion, LoadState, LoadTarget,
    SceneLoader,
};
use crate::catalog::{
    ClothingCatalog, ClothingCategory, ClothingItem, SelectionCallback, SelectionManager, SelectionState,
};
use crate::config::ViewerSettings;
use crate::rendering::scene::{RenderItem, SceneGraph};
use crate::utils::math::Transform;
use crate::world::{AvatarModel, AvatarOutcome, AvatarPhase, CompositionEvent, CompositionEventKind};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub avatar_uri: String,
    /// Applied to the avatar root once it loads
    pub avatar_placement: Transform,
    pub match_policy: MatchPolicy,
    pub markers: ClothingMarkers,
    pub load_timeout: Duration,
}

impl EngineOptions {
    pub fn from_settings(settings: &ViewerSettings) -> Self {
        Self {
            avatar_uri: settings.avatar.uri.clone(),
            avatar_placement: settings.avatar.placement(),
            match_policy: settings.composition.match_policy,
            markers: settings.composition.markers(),
            load_timeout: settings.loader.timeout(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_settings(&ViewerSettings::default())
    }
}

pub struct CompositionEngine {
    selection: SelectionManager,
    avatar: AvatarModel,
    compositor: EmbeddedCompositor,
    attachments: AttachmentManager,
    assets: AssetManager,
    completions: UnboundedReceiver<LoadCompletion>,
    in_flight: usize,
    events_tx: Sender<CompositionEvent>,
    events_rx: Receiver<CompositionEvent>,
}

impl std::fmt::Debug for CompositionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionEngine")
            .field("selection", self.selection.state())
            .field("avatar", &self.avatar.phase())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl CompositionEngine {
    pub fn new(
        catalog: Arc<ClothingCatalog>,
        loader: Arc<dyn SceneLoader>,
        runtime: Handle,
        options: EngineOptions,
    ) -> Self {
        let (assets, completions) = AssetManager::new(loader, runtime, options.load_timeout);
        let (events_tx, events_rx) = unbounded();

        info!(
            "Composition engine: {} catalog items, {:?} matching",
            catalog.len(),
            options.match_policy
        );

        Self {
            selection: SelectionManager::new(catalog),
            avatar: AvatarModel::new(options.avatar_uri, options.avatar_placement),
            compositor: EmbeddedCompositor::new(options.match_policy, options.markers),
            attachments: AttachmentManager::new(),
            assets,
            completions,
            in_flight: 0,
            events_tx,
            events_rx,
        }
    }

    /// Begin loading the avatar and prefetch external items of the default
    /// selection
    pub fn start(&mut self) {
        self.begin_avatar_load();
        self.recompose();
    }

    /// Select `item_id` for `category` and recompose.
    ///
    /// Only an unknown id is an error. Load failures are reported through
    /// [`CompositionEngine::events`] and [`CompositionEngine::load_state`].
    pub fn select(&mut self, category: ClothingCategory, item_id: &str) -> CompositionResult<()> {
        let change = self.selection.select(category, item_id)?;
        self.emit(CompositionEventKind::SelectionChanged {
            category,
            item_id: change.current,
        });

        self.reconcile_category(category, true);
        self.compose_embedded();
        Ok(())
    }

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    /// Observe accepted selections in addition to the engine's own events
    pub fn subscribe(&mut self, callback: SelectionCallback) {
        self.selection.subscribe(callback);
    }

    pub fn catalog(&self) -> &ClothingCatalog {
        self.selection.catalog()
    }

    pub fn selected_item(&self, category: ClothingCategory) -> Option<&ClothingItem> {
        self.selection.resolve(category)
    }

    /// Load state behind the current selection of `category`
    pub fn load_state(&self, category: ClothingCategory) -> LoadState {
        match self.selection.resolve(category).and_then(ClothingItem::model_path) {
            Some(path) => self.attachments.cache().state(path),
            None => self.avatar.load_state(),
        }
    }

    pub fn avatar_state(&self) -> AvatarPhase {
        self.avatar.phase()
    }

    pub fn avatar_error(&self) -> Option<CompositionError> {
        self.avatar.error()
    }

    /// Composed scene, `None` until the avatar has loaded
    pub fn scene(&self) -> Option<&SceneGraph> {
        self.avatar.scene()
    }

    /// Visible meshes for the render surface
    pub fn render_items(&self) -> CompositionResult<Vec<RenderItem>> {
        self.avatar
            .scene()
            .map(SceneGraph::visible_meshes)
            .ok_or(CompositionError::AvatarNotLoaded)
    }

    pub fn attached(&self, category: ClothingCategory) -> Option<&AttachedGarment> {
        self.attachments.attached(category)
    }

    /// Load cache for external models
    pub fn cache(&self) -> &AssetLoadCache {
        self.attachments.cache()
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.attachments.cache().stats()
    }

    /// Receiver for engine events. Every clone competes for the same queue.
    pub fn events(&self) -> Receiver<CompositionEvent> {
        self.events_rx.clone()
    }

    pub fn drain_events(&self) -> Vec<CompositionEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Loads spawned whose results have not been applied yet
    pub fn pending_loads(&self) -> usize {
        self.in_flight
    }

    /// Restart the failed load behind the current selection of `category`.
    /// Returns whether a load was started.
    pub fn retry(&mut self, category: ClothingCategory) -> bool {
        let Some(path) = self
            .selection
            .resolve(category)
            .and_then(ClothingItem::model_path)
            .map(str::to_string)
        else {
            return self.retry_avatar();
        };

        if self.attachments.retry(&path, &self.assets) {
            self.in_flight += 1;
            true
        } else {
            debug!("Nothing to retry for {} ({})", category, path);
            false
        }
    }

    /// Restart a failed avatar load
    pub fn retry_avatar(&mut self) -> bool {
        if self.avatar.phase() != AvatarPhase::Failed {
            debug!("Avatar is {}, not retrying", self.avatar.phase());
            return false;
        }
        self.begin_avatar_load()
    }

    /// Apply every completion that has already arrived
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions.try_recv() {
            self.on_completion(completion);
            applied += 1;
        }
        applied
    }

    /// Wait for the next completion and apply it. Returns `false` when no
    /// load is in flight.
    pub async fn next_completion(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.completions.recv().await {
            Some(completion) => {
                self.on_completion(completion);
                true
            }
            None => false,
        }
    }

    /// Apply completions until no load is in flight
    pub async fn settle(&mut self) {
        while self.next_completion().await {}
    }

    fn begin_avatar_load(&mut self) -> bool {
        match self.avatar.begin() {
            Some(attempt) => {
                let uri = self.avatar.uri().to_string();
                self.assets.begin_load(LoadTarget::BaseModel(uri), attempt);
                self.in_flight += 1;
                true
            }
            None => false,
        }
    }

    fn recompose(&mut self) {
        for category in ClothingCategory::ALL {
            self.reconcile_category(category, false);
        }
        self.compose_embedded();
    }

    /// Bring the attachment of `category` in line with its selection.
    /// A failed load is only restarted when `user_action` is set.
    fn reconcile_category(&mut self, category: ClothingCategory, user_action: bool) {
        let Some(item) = self.selection.resolve(category).cloned() else {
            return;
        };

        let Some(path) = item.model_path() else {
            self.detach(category);
            return;
        };

        if self.attachments.is_attached(category, &item.id) {
            return;
        }
        self.detach(category);

        if !user_action && self.attachments.cache().error(path).is_some() {
            debug!("{} stays failed until retried", path);
            return;
        }

        match self.attachments.ensure_loaded(path, &self.assets) {
            EnsureOutcome::Started { .. } => self.in_flight += 1,
            EnsureOutcome::InFlight => {}
            EnsureOutcome::Ready(fragment) => self.attach(category, &item, &fragment),
        }
    }

    fn compose_embedded(&mut self) -> CompositorReport {
        let Some(scene) = self.avatar.scene_mut() else {
            return CompositorReport::default();
        };
        let selection = &self.selection;
        let selected = ClothingCategory::ALL
            .into_iter()
            .filter_map(|category| selection.resolve(category));
        self.compositor.apply(scene, selected)
    }

    fn attach(&mut self, category: ClothingCategory, item: &ClothingItem, fragment: &SceneGraph) {
        let Some(scene) = self.avatar.scene_mut() else {
            debug!("Avatar not loaded, deferring {} for {}", item.id, category);
            return;
        };
        if self.attachments.attach(scene, category, item, fragment).is_some() {
            self.emit(CompositionEventKind::GarmentAttached {
                category,
                item_id: item.id.clone(),
            });
        }
    }

    fn detach(&mut self, category: ClothingCategory) {
        let detached = match self.avatar.scene_mut() {
            Some(scene) => self.attachments.detach(scene, category),
            None => None,
        };
        if let Some(garment) = detached {
            self.emit(CompositionEventKind::GarmentDetached {
                category,
                item_id: garment.item_id,
            });
        }
    }

    /// Categories whose current selection loads `path` and is not attached
    fn waiting_on(&self, path: &str) -> Vec<(ClothingCategory, ClothingItem)> {
        ClothingCategory::ALL
            .into_iter()
            .filter_map(|category| {
                let item = self.selection.resolve(category)?;
                (item.model_path() == Some(path) && !self.attachments.is_attached(category, &item.id))
                    .then(|| (category, item.clone()))
            })
            .collect()
    }

    fn on_completion(&mut self, completion: LoadCompletion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let LoadCompletion {
            target,
            attempt,
            result,
            elapsed,
        } = completion;

        match target {
            LoadTarget::BaseModel(uri) => match self.avatar.complete(attempt, result) {
                AvatarOutcome::Loaded => {
                    self.emit(CompositionEventKind::AvatarLoaded { uri, elapsed });
                    self.recompose();
                }
                AvatarOutcome::Failed(error) => {
                    self.emit(CompositionEventKind::AvatarLoadFailed { error });
                }
                AvatarOutcome::Stale => {}
            },
            LoadTarget::External(path) => {
                match self.attachments.cache_mut().complete(&path, attempt, result) {
                    CompletionOutcome::Loaded(fragment) => {
                        self.emit(CompositionEventKind::AssetLoaded {
                            path: path.clone(),
                            elapsed,
                        });

                        let waiting = self.waiting_on(&path);
                        if waiting.is_empty() {
                            info!("No category selects {} anymore, keeping it cached only", path);
                            self.emit(CompositionEventKind::StaleResultDiscarded { path });
                            return;
                        }
                        for (category, item) in waiting {
                            self.attach(category, &item, &fragment);
                        }
                    }
                    CompletionOutcome::Failed(error) => {
                        let categories: Vec<_> = self
                            .waiting_on(&path)
                            .into_iter()
                            .map(|(category, _)| category)
                            .collect();
                        warn!("Load of {} failed for {:?}: {}", path, categories, error);
                        self.emit(CompositionEventKind::AssetLoadFailed {
                            path: path.clone(),
                            categories,
                            error: CompositionError::AssetLoadFailure {
                                path,
                                reason: error.to_string(),
                            },
                        });
                    }
                    CompletionOutcome::Stale => {}
                }
            }
        }
    }

    fn emit(&self, kind: CompositionEventKind) {
        // the engine holds a receiver itself, so this cannot fail
        let _ = self.events_tx.send(CompositionEvent::new(kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::material::Material;
    use crate::assets::LoadError;
    use crate::rendering::scene::SceneNode;
    use crate::utils::math::Color;
    use async_trait::async_trait;

    const BLUE: Color = Color::rgba(0.0, 0.0, 1.0, 1.0);

    /// Resolves immediately; the avatar carries one mesh per embedded item
    struct InstantLoader;

    #[async_trait]
    impl SceneLoader for InstantLoader {
        async fn load(&self, source: &str) -> Result<SceneGraph, LoadError> {
            let mut graph = SceneGraph::new(source);
            let root = graph.root();
            if source.ends_with("avatar.glb") {
                let top = graph.add_material(Material::new("Top", Color::WHITE));
                let bottom = graph.add_material(Material::new("Bottom", Color::WHITE));
                graph.add_child(root, SceneNode::mesh("Wolf3D_Body", top));
                graph.add_child(root, SceneNode::mesh("Wolf3D_Outfit_Top", top));
                graph.add_child(root, SceneNode::mesh("Wolf3D_Outfit_Bottom", bottom));
            } else if source == "/missing.glb" {
                return Err(LoadError::Io {
                    source_path: source.to_string(),
                    reason: "not found".into(),
                });
            } else {
                let cloth = graph.add_material(Material::new("Cloth", Color::WHITE));
                graph.add_child(root, SceneNode::mesh("Jacket", cloth));
            }
            Ok(graph)
        }
    }

    fn catalog() -> Arc<ClothingCatalog> {
        Arc::new(
            ClothingCatalog::from_items(vec![
                ClothingItem::embedded("T1", "Tee", ClothingCategory::Top, "Wolf3D_Outfit_Top"),
                ClothingItem::external("T2", "Jacket", ClothingCategory::Top, "/jacket.glb").with_color(BLUE),
                ClothingItem::external("T3", "Ghost", ClothingCategory::Top, "/missing.glb"),
                ClothingItem::embedded("B1", "Jeans", ClothingCategory::Bottom, "Wolf3D_Outfit_Bottom"),
            ])
            .unwrap(),
        )
    }

    fn engine() -> CompositionEngine {
        let options = EngineOptions {
            avatar_uri: "/avatar.glb".into(),
            ..EngineOptions::default()
        };
        CompositionEngine::new(catalog(), Arc::new(InstantLoader), Handle::current(), options)
    }

    fn visible(engine: &CompositionEngine) -> Vec<String> {
        let mut names: Vec<_> = engine.render_items().unwrap().into_iter().map(|item| item.name).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_start_loads_avatar_and_composes() {
        let mut engine = engine();
        assert_eq!(engine.render_items(), Err(CompositionError::AvatarNotLoaded));

        engine.start();
        assert_eq!(engine.avatar_state(), AvatarPhase::Loading);
        engine.settle().await;

        assert_eq!(engine.avatar_state(), AvatarPhase::Loaded);
        assert_eq!(engine.pending_loads(), 0);
        assert_eq!(
            visible(&engine),
            vec!["Wolf3D_Body", "Wolf3D_Outfit_Bottom", "Wolf3D_Outfit_Top"]
        );
        assert!(engine
            .drain_events()
            .iter()
            .any(|e| matches!(e.kind, CompositionEventKind::AvatarLoaded { .. })));
    }

    #[tokio::test]
    async fn test_external_selection_attaches_after_load() {
        let mut engine = engine();
        engine.start();
        engine.settle().await;

        engine.select(ClothingCategory::Top, "T2").unwrap();
        assert_eq!(engine.load_state(ClothingCategory::Top), LoadState::Loading);
        engine.settle().await;

        assert_eq!(engine.load_state(ClothingCategory::Top), LoadState::Loaded);
        assert_eq!(engine.attached(ClothingCategory::Top).unwrap().item_id, "T2");
        assert_eq!(visible(&engine), vec!["Jacket", "Wolf3D_Body", "Wolf3D_Outfit_Bottom"]);
    }

    #[tokio::test]
    async fn test_failed_load_is_reported_not_returned() {
        let mut engine = engine();
        engine.start();
        engine.settle().await;
        engine.drain_events();

        assert!(engine.select(ClothingCategory::Top, "T3").is_ok());
        engine.settle().await;

        assert!(engine.load_state(ClothingCategory::Top).is_failed());
        assert_eq!(engine.selection().get(ClothingCategory::Top), Some("T3"));
        assert!(engine.attached(ClothingCategory::Top).is_none());

        let errors: Vec<_> = engine.drain_events().into_iter().filter(|e| e.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0].kind,
            CompositionEventKind::AssetLoadFailed { categories, .. } if categories == &[ClothingCategory::Top]
        ));
    }

    #[tokio::test]
    async fn test_retry_of_embedded_selection_targets_avatar() {
        let mut engine = engine();
        engine.start();
        engine.settle().await;

        // avatar is loaded, so there is nothing to restart
        assert!(!engine.retry(ClothingCategory::Bottom));
        assert!(!engine.retry_avatar());
    }
}
