use std::panic;
use std::thread;

use prodviz_contracts::events::EventWriter;
use prodviz_contracts::images::OriginalImage;
use serde_json::json;
use tracing::{info, warn};

use crate::emit_event;
use crate::error::{EngineError, Result};
use crate::tasks::{self, CancelToken, PollPolicy, TaskBackend, TaskRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scene {
    pub key: &'static str,
    pub prompt: &'static str,
}

pub const SCENES: [Scene; 3] = [
    Scene {
        key: "mug",
        prompt: "Place this product onto a white coffee mug. The mug is on a wooden table in a bright, modern cafe. The product should be clearly visible and centered on the mug.",
    },
    Scene {
        key: "t-shirt",
        prompt: "Render this product onto the front of a black cotton t-shirt worn by a person walking down a vibrant city street. The product logo or design should be prominent.",
    },
    Scene {
        key: "billboard",
        prompt: "Display this product on a massive, glowing billboard in a futuristic city at night, similar to Times Square. The lighting should be dramatic and eye-catching.",
    },
];

#[derive(Debug)]
pub struct SceneFailure {
    pub scene: &'static str,
    pub error: EngineError,
}

/// All-settled result of a batch: successes in scene order, failures kept
/// aside instead of aborting the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<String>,
    pub failures: Vec<SceneFailure>,
}

impl BatchOutcome {
    pub fn all_failed(&self) -> bool {
        self.results.is_empty() && !self.failures.is_empty()
    }
}

/// Turns image + prompt pairs into finished result references through the
/// submit-then-poll task protocol.
pub struct VisualizationOrchestrator<B> {
    backend: B,
    policy: PollPolicy,
    cancel: CancelToken,
    events: EventWriter,
}

impl<B: TaskBackend> VisualizationOrchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            policy: PollPolicy::default(),
            cancel: CancelToken::new(),
            events: EventWriter::disabled("orchestrator"),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Handle that aborts every poll loop started by this orchestrator.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn submit_task(&self, reference_image: &str, prompt: &str) -> Result<String> {
        let task_id = tasks::submit_task(&self.backend, &TaskRequest::new(prompt, reference_image))?;
        emit_event(
            &self.events,
            "task_submitted",
            json!({ "task_id": task_id, "backend": self.backend.name() }),
        );
        Ok(task_id)
    }

    pub fn poll_task(&self, task_id: &str) -> Result<String> {
        tasks::poll_task(
            &self.backend,
            task_id,
            &self.policy,
            &self.cancel,
            &self.events,
        )
    }

    /// Three canned scenes, one concurrent task each.
    pub fn generate_visualizations(&self, image: &OriginalImage) -> BatchOutcome {
        self.generate_scenes(image.base64(), &SCENES)
    }

    pub fn generate_scenes(&self, reference_image: &str, scenes: &[Scene]) -> BatchOutcome {
        let settled: Vec<(&'static str, Result<String>)> = thread::scope(|scope| {
            let handles: Vec<_> = scenes
                .iter()
                .map(|scene| {
                    let handle = scope.spawn(move || self.run_task(reference_image, scene));
                    (scene.key, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(key, handle)| match handle.join() {
                    Ok(result) => (key, result),
                    Err(payload) => panic::resume_unwind(payload),
                })
                .collect()
        });

        let mut outcome = BatchOutcome::default();
        for (scene, result) in settled {
            match result {
                Ok(result) => outcome.results.push(result),
                Err(error) => {
                    warn!(scene, "dropping failed visualization: {error}");
                    outcome.failures.push(SceneFailure { scene, error });
                }
            }
        }
        emit_event(
            &self.events,
            "batch_finished",
            json!({
                "succeeded": outcome.results.len(),
                "failed": outcome
                    .failures
                    .iter()
                    .map(|failure| json!({ "scene": failure.scene, "error": failure.error.to_string() }))
                    .collect::<Vec<_>>(),
            }),
        );
        outcome
    }

    /// Single round trip; failures go straight back to the caller.
    pub fn edit_image(&self, reference_image: &str, prompt: &str) -> Result<String> {
        let result = self
            .submit_task(reference_image, prompt)
            .and_then(|task_id| self.poll_task(&task_id));
        self.record_settled("edit", &result);
        result
    }

    fn run_task(&self, reference_image: &str, scene: &Scene) -> Result<String> {
        let result = self
            .submit_task(reference_image, scene.prompt)
            .and_then(|task_id| self.poll_task(&task_id));
        self.record_settled(scene.key, &result);
        result
    }

    fn record_settled(&self, label: &str, result: &Result<String>) {
        match result {
            Ok(reference) => {
                info!(label, "task completed");
                emit_event(
                    &self.events,
                    "task_completed",
                    json!({ "label": label, "result": reference }),
                );
            }
            Err(err) => emit_event(
                &self.events,
                "task_failed",
                json!({ "label": label, "error": err.to_string() }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{fast_policy, sample_upload, ScriptedTasks};

    fn orchestrator(backend: ScriptedTasks) -> VisualizationOrchestrator<ScriptedTasks> {
        VisualizationOrchestrator::new(backend).with_policy(fast_policy())
    }

    fn route_scenes(backend: &ScriptedTasks) {
        backend.route_prompts_containing("coffee mug", "mug-task");
        backend.route_prompts_containing("t-shirt", "shirt-task");
        backend.route_prompts_containing("billboard", "billboard-task");
    }

    #[test]
    fn all_scenes_succeed() {
        let backend = ScriptedTasks::new();
        route_scenes(&backend);
        backend.complete_after("mug-task", 2, "https://cdn/mug.png");
        backend.complete_after("shirt-task", 0, "https://cdn/shirt.png");
        backend.complete_after("billboard-task", 4, "https://cdn/billboard.png");

        let orchestrator = orchestrator(backend);
        let outcome = orchestrator.generate_visualizations(&sample_upload());

        let mut results = outcome.results.clone();
        results.sort();
        assert_eq!(
            results,
            vec![
                "https://cdn/billboard.png",
                "https://cdn/mug.png",
                "https://cdn/shirt.png"
            ]
        );
        assert!(outcome.failures.is_empty());

        let created = orchestrator.backend().created();
        assert_eq!(created.len(), 3);
        let upload = sample_upload();
        assert!(created
            .iter()
            .all(|request| request.reference_images == vec![upload.base64().to_string()]));
    }

    #[test]
    fn failed_scenes_are_dropped_not_fatal() {
        let backend = ScriptedTasks::new();
        route_scenes(&backend);
        backend.complete_after("mug-task", 1, "https://cdn/mug.png");
        backend.script("shirt-task", vec![json!({ "data": { "status": "FAILED" } })]);
        backend.script(
            "billboard-task",
            vec![json!({ "data": { "status": "COMPLETED", "generated": [] } })],
        );

        let outcome = orchestrator(backend).generate_visualizations(&sample_upload());
        assert_eq!(outcome.results, vec!["https://cdn/mug.png"]);
        assert_eq!(outcome.failures.len(), 2);
        assert!(!outcome.all_failed());

        let mut failed: Vec<&str> = outcome.failures.iter().map(|failure| failure.scene).collect();
        failed.sort();
        assert_eq!(failed, vec!["billboard", "t-shirt"]);
    }

    #[test]
    fn submission_failures_only_drop_their_scene() {
        let backend = ScriptedTasks::new();
        route_scenes(&backend);
        backend.offline_for_prompts_containing("billboard");
        backend.complete_after("mug-task", 0, "mug");
        backend.complete_after("shirt-task", 0, "shirt");

        let outcome = orchestrator(backend).generate_visualizations(&sample_upload());
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(outcome.failures[0].error, EngineError::Network(_)));
    }

    #[test]
    fn batch_of_n_with_m_failures_returns_n_minus_m() {
        let scenes: Vec<Scene> = ["alpha", "beta", "gamma", "delta", "epsilon"]
            .into_iter()
            .map(|key| Scene { key, prompt: key })
            .collect();
        for failing in 0..=scenes.len() {
            let backend = ScriptedTasks::new();
            for (idx, scene) in scenes.iter().enumerate() {
                backend.route_prompts_containing(scene.prompt, scene.key);
                if idx < failing {
                    backend.script(scene.key, vec![json!({ "data": { "status": "FAILED" } })]);
                } else {
                    backend.complete_after(scene.key, idx, scene.key);
                }
            }
            let outcome = orchestrator(backend).generate_scenes("AAAA", &scenes);
            assert_eq!(outcome.results.len(), scenes.len() - failing);
            assert_eq!(outcome.failures.len(), failing);
            assert_eq!(outcome.all_failed(), failing == scenes.len());
        }
    }

    #[test]
    fn edit_propagates_failed_status() {
        let backend = ScriptedTasks::new();
        backend.route_prompts_containing("make it blue", "edit-task");
        backend.script(
            "edit-task",
            vec![
                json!({ "data": { "status": "IN_PROGRESS" } }),
                json!({ "data": { "status": "FAILED" } }),
            ],
        );
        let err = orchestrator(backend)
            .edit_image("https://cdn/mug.png", "make it blue")
            .unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailed { ref task_id } if task_id == "edit-task"));
    }

    #[test]
    fn edit_returns_new_reference() -> anyhow::Result<()> {
        let backend = ScriptedTasks::new();
        backend.route_prompts_containing("make it blue", "edit-task");
        backend.complete_after("edit-task", 3, "https://cdn/blue.png");
        let orchestrator = orchestrator(backend);
        let result = orchestrator.edit_image("https://cdn/mug.png", "make it blue")?;
        assert_eq!(result, "https://cdn/blue.png");
        assert_eq!(
            orchestrator.backend().created()[0].reference_images,
            vec!["https://cdn/mug.png"]
        );
        Ok(())
    }

    #[test]
    fn cancelling_stops_every_scene() {
        let backend = ScriptedTasks::new();
        route_scenes(&backend);
        for task in ["mug-task", "shirt-task", "billboard-task"] {
            backend.script_forever(task, json!({ "data": { "status": "IN_PROGRESS" } }));
        }
        let orchestrator = orchestrator(backend);
        orchestrator.cancel_token().cancel();
        let outcome = orchestrator.generate_visualizations(&sample_upload());
        assert!(outcome.all_failed());
        assert!(outcome
            .failures
            .iter()
            .all(|failure| matches!(failure.error, EngineError::Cancelled)));
    }

    #[test]
    fn batch_events_are_written() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let backend = ScriptedTasks::new();
        route_scenes(&backend);
        backend.complete_after("mug-task", 0, "mug");
        backend.script("shirt-task", vec![json!({ "data": { "status": "FAILED" } })]);
        backend.complete_after("billboard-task", 0, "billboard");

        orchestrator(backend)
            .with_events(EventWriter::new(&path, "batch"))
            .generate_visualizations(&sample_upload());

        let rows: Vec<serde_json::Value> = std::fs::read_to_string(&path)?
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let count = |kind: &str| rows.iter().filter(|row| row["type"] == kind).count();
        assert_eq!(count("task_submitted"), 3);
        assert_eq!(count("task_completed"), 2);
        assert_eq!(count("task_failed"), 1);
        let finished = rows
            .iter()
            .find(|row| row["type"] == "batch_finished")
            .expect("batch_finished event");
        assert_eq!(finished["succeeded"], 2);
        assert_eq!(finished["failed"][0]["scene"], "t-shirt");
        Ok(())
    }
}
