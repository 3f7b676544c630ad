//! Panel coordinator scenarios.

#[cfg(test)]
mod tests {
    use crate::config::PanelConfig;
    use crate::consent::{ConsentDenial, DenialReason};
    use crate::coordinators::panels::{PanelCoordinator, PanelOutcome, PanelState};
    use crate::core::WorkerStatus;
    use crate::events::{kinds, CollectingEventSink};
    use crate::testing::{ScriptedWorkerFactory, WorkerOp};
    use crate::worker::Consent;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const MAIN: &str = "main";

    fn coordinator(factory: &Arc<ScriptedWorkerFactory>) -> PanelCoordinator {
        PanelCoordinator::new(factory.clone(), PanelConfig::default()).unwrap()
    }

    fn opened(panel: &str) -> PanelOutcome {
        PanelOutcome::Opened {
            panel: panel.to_string(),
        }
    }

    async fn open_all(panels: &PanelCoordinator, keys: &[&str]) {
        for key in keys {
            let outcome = panels.open(MAIN, key, Value::Null).await.unwrap();
            assert_eq!(outcome, opened(key));
        }
    }

    #[tokio::test]
    async fn test_open_stacks_panels() {
        let factory = ScriptedWorkerFactory::new();
        let panels = coordinator(&factory);

        open_all(&panels, &["menu", "dialog"]).await;

        assert_eq!(panels.open_panels(MAIN), vec!["menu", "dialog"]);
        assert_eq!(panels.top_panel(MAIN).as_deref(), Some("dialog"));
        assert_eq!(panels.panel_status(MAIN, "menu"), Some(WorkerStatus::Running));
        assert_eq!(factory.latest("dialog").unwrap().launches()[0].depth, 1);
        assert_eq!(panels.context(MAIN).unwrap().current_state, PanelState::Idle);
        assert_eq!(panels.pending_cancellations(MAIN), 0);
    }

    #[tokio::test]
    async fn test_reopening_raises_without_rebuild() {
        let factory = ScriptedWorkerFactory::new();
        let panels = coordinator(&factory);
        open_all(&panels, &["menu", "dialog"]).await;

        let outcome = panels.open(MAIN, "menu", Value::Null).await.unwrap();

        assert_eq!(
            outcome,
            PanelOutcome::Raised {
                panel: "menu".to_string()
            }
        );
        assert_eq!(panels.open_panels(MAIN), vec!["dialog", "menu"]);
        assert_eq!(factory.created("menu").len(), 1);
    }

    #[tokio::test]
    async fn test_close_removes_panel_from_middle() {
        let factory = ScriptedWorkerFactory::new();
        let panels = coordinator(&factory);
        open_all(&panels, &["menu", "dialog", "toast"]).await;
        factory.log().clear();

        let outcome = panels.close(MAIN, "dialog").await.unwrap();

        assert_eq!(
            outcome,
            PanelOutcome::Closed {
                panels: vec!["dialog".to_string()]
            }
        );
        assert_eq!(panels.open_panels(MAIN), vec!["menu", "toast"]);
        assert_eq!(factory.log().keys_for(WorkerOp::RequestConsent), vec!["dialog"]);
        assert_eq!(factory.log().keys_for(WorkerOp::Destroy), vec!["dialog"]);
    }

    #[tokio::test]
    async fn test_close_all_polls_and_destroys_topmost_first() {
        let factory = ScriptedWorkerFactory::new();
        let panels = coordinator(&factory);
        open_all(&panels, &["a", "b", "c"]).await;
        factory.log().clear();

        let outcome = panels.close_all(MAIN).await.unwrap();

        assert_eq!(
            outcome,
            PanelOutcome::Closed {
                panels: vec!["c".to_string(), "b".to_string(), "a".to_string()]
            }
        );
        assert_eq!(factory.log().keys_for(WorkerOp::RequestConsent), vec!["c", "b", "a"]);
        assert_eq!(factory.log().keys_for(WorkerOp::Destroy), vec!["c", "b", "a"]);
        assert!(panels.open_panels(MAIN).is_empty());
    }

    #[tokio::test]
    async fn test_refusal_keeps_every_panel() {
        let factory = ScriptedWorkerFactory::new();
        factory.deny_consent("b");
        let panels = coordinator(&factory);
        open_all(&panels, &["a", "b", "c"]).await;

        let outcome = panels.close_all(MAIN).await.unwrap();

        assert_eq!(
            outcome,
            PanelOutcome::Refused(ConsentDenial {
                worker: "b".to_string(),
                reason: DenialReason::Refused,
            })
        );
        assert_eq!(panels.open_panels(MAIN), vec!["a", "b", "c"]);
        for key in ["a", "b", "c"] {
            assert_eq!(panels.panel_status(MAIN, key), Some(WorkerStatus::Running));
        }
        assert!(factory.log().keys_for(WorkerOp::Destroy).is_empty());
        assert!(panels
            .context(MAIN)
            .unwrap()
            .path
            .contains(&PanelState::Refused));
    }

    #[tokio::test]
    async fn test_closed_panel_state_is_restored_on_reopen() {
        let factory = ScriptedWorkerFactory::new();
        factory.consent_with("search", Consent::approve_with(json!({ "query": "rust" })));
        let panels = coordinator(&factory);
        open_all(&panels, &["search"]).await;

        panels.close(MAIN, "search").await.unwrap();
        panels
            .open(MAIN, "search", json!({ "focus": true }))
            .await
            .unwrap();

        let launch = factory.latest("search").unwrap().launches()[0].clone();
        assert_eq!(launch.restored_state, Some(json!({ "query": "rust" })));
        assert_eq!(launch.params, json!({ "focus": true }));
    }

    #[tokio::test]
    async fn test_failed_panel_build_is_cancelled() {
        let factory = ScriptedWorkerFactory::new();
        factory.fail_build("broken", "no template");
        let panels = coordinator(&factory);
        open_all(&panels, &["menu"]).await;

        let outcome = panels.open(MAIN, "broken", Value::Null).await.unwrap();

        match outcome {
            PanelOutcome::Failed { panel, error } => {
                assert_eq!(panel, "broken");
                assert!(error.contains("no template"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(factory.log().keys_for(WorkerOp::CancelBuild), vec!["broken"]);
        assert_eq!(panels.open_panels(MAIN), vec!["menu"]);
        assert_eq!(panels.context(MAIN).unwrap().current_state, PanelState::Idle);
    }

    #[tokio::test]
    async fn test_new_request_aborts_building_panel() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_build("slow");
        let panels = Arc::new(coordinator(&factory));

        let first = {
            let panels = Arc::clone(&panels);
            tokio::spawn(async move { panels.open(MAIN, "slow", Value::Null).await })
        };
        gate.wait_started().await;
        assert_eq!(panels.context(MAIN).unwrap().current_state, PanelState::Opening);
        assert_eq!(panels.pending_cancellations(MAIN), 1);

        let second = panels.open(MAIN, "fast", Value::Null).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, PanelOutcome::Superseded);
        assert_eq!(second, opened("fast"));
        assert_eq!(factory.log().keys_for(WorkerOp::CancelBuild), vec!["slow"]);
        assert_eq!(panels.open_panels(MAIN), vec!["fast"]);
        assert_eq!(
            panels.context(MAIN).unwrap().path,
            vec![
                PanelState::Aborted,
                PanelState::Polling,
                PanelState::Dismissing,
                PanelState::Opening,
                PanelState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_raising_open_panel_aborts_building_panel() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_build("dialog");
        let panels = Arc::new(coordinator(&factory));
        open_all(&panels, &["menu"]).await;

        let building = {
            let panels = Arc::clone(&panels);
            tokio::spawn(async move { panels.open(MAIN, "dialog", Value::Null).await })
        };
        gate.wait_started().await;

        let raised = panels.open(MAIN, "menu", Value::Null).await.unwrap();
        let building = building.await.unwrap().unwrap();

        assert_eq!(
            raised,
            PanelOutcome::Raised {
                panel: "menu".to_string()
            }
        );
        assert_eq!(building, PanelOutcome::Superseded);
        assert_eq!(factory.log().keys_for(WorkerOp::CancelBuild), vec!["dialog"]);
        assert_eq!(panels.open_panels(MAIN), vec!["menu"]);
        assert_eq!(panels.top_panel(MAIN).as_deref(), Some("menu"));
        assert_eq!(panels.pending_cancellations(MAIN), 0);
        assert_eq!(panels.context(MAIN).unwrap().path[0], PanelState::Aborted);
    }

    #[tokio::test]
    async fn test_requests_rejected_while_polling() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_consent("menu");
        let panels = Arc::new(coordinator(&factory));
        open_all(&panels, &["menu", "dialog"]).await;

        let closing = {
            let panels = Arc::clone(&panels);
            tokio::spawn(async move { panels.close(MAIN, "menu").await })
        };
        gate.wait_started().await;
        assert!(panels.is_locked(MAIN));

        assert_eq!(
            panels.open(MAIN, "toast", Value::Null).await.unwrap(),
            PanelOutcome::Rejected
        );
        assert_eq!(
            panels.open(MAIN, "dialog", Value::Null).await.unwrap(),
            PanelOutcome::Rejected
        );

        gate.release();
        assert_eq!(
            closing.await.unwrap().unwrap(),
            PanelOutcome::Closed {
                panels: vec!["menu".to_string()]
            }
        );
        assert_eq!(panels.open_panels(MAIN), vec!["dialog"]);
    }

    #[tokio::test]
    async fn test_nothing_to_close_is_unchanged() {
        let factory = ScriptedWorkerFactory::new();
        let panels = coordinator(&factory);

        assert_eq!(panels.close(MAIN, "menu").await.unwrap(), PanelOutcome::Unchanged);
        assert_eq!(panels.close_all(MAIN).await.unwrap(), PanelOutcome::Unchanged);
        assert!(panels.context(MAIN).is_none());
    }

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let factory = ScriptedWorkerFactory::new();
        let panels = coordinator(&factory);

        let (left, right) = tokio::join!(
            panels.open("left", "menu", Value::Null),
            panels.open("right", "menu", Value::Null)
        );

        assert_eq!(left.unwrap(), opened("menu"));
        assert_eq!(right.unwrap(), opened("menu"));
        assert_eq!(factory.created("menu").len(), 2);

        panels.close("left", "menu").await.unwrap();
        assert!(panels.open_panels("left").is_empty());
        assert_eq!(panels.open_panels("right"), vec!["menu"]);
    }

    #[tokio::test]
    async fn test_close_all_contexts() {
        let factory = ScriptedWorkerFactory::new();
        factory.deny_consent("pinned");
        let panels = coordinator(&factory);
        panels.open("left", "menu", Value::Null).await.unwrap();
        panels.open("left", "dialog", Value::Null).await.unwrap();
        panels.open("right", "pinned", Value::Null).await.unwrap();

        let mut outcomes = panels.close_all_contexts().await;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "left");
        assert_eq!(
            *outcomes[0].1.as_ref().unwrap(),
            PanelOutcome::Closed {
                panels: vec!["dialog".to_string(), "menu".to_string()]
            }
        );
        assert!(matches!(
            outcomes[1].1.as_ref().unwrap(),
            PanelOutcome::Refused(denial) if denial.worker == "pinned"
        ));
        assert!(panels.open_panels("left").is_empty());
        assert_eq!(panels.open_panels("right"), vec!["pinned"]);
    }

    #[tokio::test]
    async fn test_events_use_context_as_build_id() {
        let factory = ScriptedWorkerFactory::new();
        let sink = Arc::new(CollectingEventSink::new());
        let panels = coordinator(&factory).with_event_sink(sink.clone());

        open_all(&panels, &["menu"]).await;

        let completed = sink.events_of_type(kinds::BUILD_COMPLETED)[0].clone().unwrap();
        assert_eq!(completed["build_id"], MAIN);
        assert_eq!(completed["state"], "idle");
        assert_eq!(sink.events_of_type(kinds::STATE_ENTERED).len(), 3);
    }
}
