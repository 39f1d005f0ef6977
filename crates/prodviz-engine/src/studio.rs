use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use prodviz_contracts::images::{
    GeneratedImage, ImageDecodeError, OriginalImage, GENERATED_MIME_TYPE,
};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::orchestrator::{BatchOutcome, VisualizationOrchestrator};
use crate::slot::RequestSlot;
use crate::tasks::TaskBackend;

pub const UPLOAD_FAILED: &str = "Failed to read image file. Please try another one.";
pub const GENERATION_FAILED: &str =
    "Failed to generate visualizations. Please check your API key and try again.";
pub const EDIT_FAILED: &str = "Failed to edit the image. Please try again.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudioState {
    pub original: Option<OriginalImage>,
    pub images: Vec<GeneratedImage>,
    pub selected: Option<String>,
    pub error: Option<String>,
    pub is_generating: bool,
}

impl StudioState {
    pub fn selected_image(&self) -> Option<&GeneratedImage> {
        let id = self.selected.as_deref()?;
        self.images.iter().find(|image| image.id == id)
    }

    fn image_mut(&mut self, id: &str) -> Option<&mut GeneratedImage> {
        self.images.iter_mut().find(|image| image.id == id)
    }
}

/// Upload, batch generation, selection and editing of product renders.
///
/// State sits behind a mutex that is never held across a network call;
/// generation and editing each take a [`RequestSlot`] so a second request of
/// the same kind is rejected while one is outstanding.
pub struct VisualizerStudio<B> {
    orchestrator: VisualizationOrchestrator<B>,
    state: Mutex<StudioState>,
    generating: RequestSlot,
    editing: RequestSlot,
}

impl<B: TaskBackend> VisualizerStudio<B> {
    pub fn new(orchestrator: VisualizationOrchestrator<B>) -> Self {
        Self {
            orchestrator,
            state: Mutex::new(StudioState::default()),
            generating: RequestSlot::new("generation"),
            editing: RequestSlot::new("edit"),
        }
    }

    pub fn orchestrator(&self) -> &VisualizationOrchestrator<B> {
        &self.orchestrator
    }

    pub fn snapshot(&self) -> StudioState {
        self.state().clone()
    }

    pub fn upload_path(&self, path: &Path) -> Result<()> {
        self.accept_upload(OriginalImage::from_path(path))
    }

    pub fn upload_bytes(&self, bytes: &[u8], file_name: &str) -> Result<()> {
        self.accept_upload(OriginalImage::from_bytes(bytes, file_name))
    }

    fn accept_upload(
        &self,
        decoded: std::result::Result<OriginalImage, ImageDecodeError>,
    ) -> Result<()> {
        let mut state = self.state();
        state.error = None;
        state.images.clear();
        state.selected = None;
        match decoded {
            Ok(image) => {
                state.original = Some(image);
                Ok(())
            }
            Err(err) => {
                warn!("upload rejected: {err}");
                state.error = Some(UPLOAD_FAILED.to_string());
                state.original = None;
                Err(err.into())
            }
        }
    }

    /// Replaces the grid with one image per successful scene. When no scene
    /// succeeds the grid stays empty and the state carries an error message.
    pub fn generate(&self) -> Result<BatchOutcome> {
        let _generating = self.generating.try_acquire()?;
        let original = {
            let mut state = self.state();
            let original = state
                .original
                .clone()
                .ok_or(EngineError::Precondition("upload an image first"))?;
            state.is_generating = true;
            state.error = None;
            state.images.clear();
            state.selected = None;
            original
        };

        let outcome = self.orchestrator.generate_visualizations(&original);

        let mut state = self.state();
        state.is_generating = false;
        state.images = GeneratedImage::batch(&outcome.results);
        if outcome.results.is_empty() {
            state.error = Some(GENERATION_FAILED.to_string());
        }
        Ok(outcome)
    }

    /// Selecting an id that is not in the grid changes nothing.
    pub fn select(&self, id: &str) -> bool {
        let mut state = self.state();
        if state.images.iter().any(|image| image.id == id) {
            state.selected = Some(id.to_string());
            return true;
        }
        false
    }

    pub fn edit_selected(&self, prompt: &str) -> Result<GeneratedImage> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EngineError::Precondition("edit prompt is empty"));
        }
        let _editing = self.editing.try_acquire()?;

        let (id, src) = {
            let mut state = self.state();
            let id = state
                .selected
                .clone()
                .ok_or(EngineError::Precondition("select an image to edit"))?;
            state.error = None;
            let image = state
                .image_mut(&id)
                .ok_or(EngineError::Precondition("select an image to edit"))?;
            image.is_editing = true;
            (id, image.src.clone())
        };

        let result = self.orchestrator.edit_image(&src, prompt);

        let mut state = self.state();
        if result.is_err() {
            state.error = Some(EDIT_FAILED.to_string());
        }
        let Some(image) = state.image_mut(&id) else {
            // the grid was regenerated while the edit was in flight
            return result.map(|src| GeneratedImage {
                id,
                src,
                is_editing: false,
                mime_type: GENERATED_MIME_TYPE.to_string(),
            });
        };
        image.is_editing = false;
        let src = result?;
        image.src = src;
        Ok(image.clone())
    }

    fn state(&self) -> MutexGuard<'_, StudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
