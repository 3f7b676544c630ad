//! Navigation scenarios for the router.

#[cfg(test)]
mod tests {
    use crate::config::RouterConfig;
    use crate::consent::{ConsentDenial, DenialReason};
    use crate::coordinators::router::{NavigationOutcome, Route, RouteState, Router};
    use crate::core::WorkerStatus;
    use crate::events::{kinds, CollectingEventSink, EventSink};
    use crate::testing::{ScriptedWorkerFactory, WorkerOp};
    use crate::worker::Consent;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::{Arc, Weak};

    fn router(factory: &Arc<ScriptedWorkerFactory>) -> Router {
        Router::new(factory.clone(), RouterConfig::default()).unwrap()
    }

    fn navigated(url: &str) -> NavigationOutcome {
        NavigationOutcome::Navigated {
            url: url.to_string(),
            restored: false,
        }
    }

    /// Records the router's url whenever its engine enters `complete`.
    #[derive(Default)]
    struct CompletionWatcher {
        router: Mutex<Option<Weak<Router>>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl EventSink for CompletionWatcher {
        async fn emit(&self, event_type: &str, data: Option<Value>) {
            self.try_emit(event_type, data);
        }

        fn try_emit(&self, event_type: &str, data: Option<Value>) {
            let entered_complete = event_type == kinds::STATE_ENTERED
                && data.as_ref().is_some_and(|data| data["state"] == "complete");
            if !entered_complete {
                return;
            }
            let router = self.router.lock().as_ref().and_then(Weak::upgrade);
            if let Some(router) = router {
                self.seen.lock().push(router.current_url());
            }
        }
    }

    #[tokio::test]
    async fn test_deeper_route_builds_only_new_child() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        router.push(Route::new("/a", ["T", "A"])).await.unwrap();
        factory.log().clear();

        let outcome = router.push(Route::new("/a/b", ["T", "A", "B"])).await.unwrap();

        assert_eq!(outcome, navigated("/a/b"));
        // consent is polled from the deepest worker up
        assert_eq!(factory.log().keys_for(WorkerOp::RequestConsent), vec!["A", "T"]);
        assert!(factory.log().keys_for(WorkerOp::Destroy).is_empty());
        assert_eq!(factory.log().keys_for(WorkerOp::Build), vec!["B"]);
        assert_eq!(router.inflated_keys(), vec!["T", "A", "B"]);
        assert_eq!(router.worker_status("A"), Some(WorkerStatus::Running));
    }

    #[tokio::test]
    async fn test_new_top_level_worker_overhauls_chain() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        router.push(Route::new("/a/b", ["T", "A", "B"])).await.unwrap();
        factory.log().clear();

        let outcome = router.push(Route::new("/c", ["T2"])).await.unwrap();

        assert_eq!(outcome, navigated("/c"));
        assert_eq!(
            factory.log().keys_for(WorkerOp::RequestConsent),
            vec!["B", "A", "T"]
        );
        assert_eq!(factory.log().keys_for(WorkerOp::Destroy), vec!["T", "A", "B"]);
        assert_eq!(factory.log().keys_for(WorkerOp::Build), vec!["T2"]);
        assert_eq!(router.inflated_keys(), vec!["T2"]);
        assert_eq!(router.history().back().len(), 1);
    }

    #[tokio::test]
    async fn test_back_to_previous_url_restores_saved_state() {
        let factory = ScriptedWorkerFactory::new();
        factory.consent_with("T", Consent::approve_with(json!({ "scroll": 120 })));
        let router = router(&factory);

        router.push(Route::new("/a", ["T"])).await.unwrap();
        router.push(Route::new("/b", ["U"])).await.unwrap();
        let outcome = router.back(Route::new("/a", ["T"])).await.unwrap();

        assert_eq!(
            outcome,
            NavigationOutcome::Navigated {
                url: "/a".to_string(),
                restored: true,
            }
        );
        let rebuilt = factory.latest("T").unwrap();
        assert_eq!(
            rebuilt.launches()[0].restored_state,
            Some(json!({ "scroll": 120 }))
        );
        assert!(router.history().back().is_empty());
        assert_eq!(router.history().forward().peek().unwrap().url(), "/b");
    }

    #[tokio::test]
    async fn test_unmatched_back_restores_nothing() {
        let factory = ScriptedWorkerFactory::new();
        factory.consent_with("T", Consent::approve_with(json!({ "scroll": 1 })));
        let router = router(&factory);
        router.push(Route::new("/a", ["T"])).await.unwrap();
        router.push(Route::new("/b", ["U"])).await.unwrap();

        let outcome = router.back(Route::new("/z", ["Z"])).await.unwrap();

        assert_eq!(outcome, navigated("/z"));
        assert_eq!(factory.latest("Z").unwrap().launches()[0].restored_state, None);
        // an unmatched pop is recorded like a push
        assert_eq!(router.history().back().len(), 2);
    }

    #[tokio::test]
    async fn test_forward_after_back_restores_state() {
        let factory = ScriptedWorkerFactory::new();
        factory.consent_with("U", Consent::approve_with(json!({ "tab": 2 })));
        let router = router(&factory);
        router.push(Route::new("/a", ["T"])).await.unwrap();
        router.push(Route::new("/b", ["U"])).await.unwrap();
        router.back(Route::new("/a", ["T"])).await.unwrap();

        let outcome = router.forward(Route::new("/b", ["U"])).await.unwrap();

        assert_eq!(
            outcome,
            NavigationOutcome::Navigated {
                url: "/b".to_string(),
                restored: true,
            }
        );
        assert_eq!(
            factory.latest("U").unwrap().launches()[0].restored_state,
            Some(json!({ "tab": 2 }))
        );
    }

    #[tokio::test]
    async fn test_new_navigation_cancels_running_build_in_reverse_order() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_build("B");
        let router = Arc::new(router(&factory));

        let first = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.push(Route::new("/a/b", ["T", "A", "B"])).await })
        };
        gate.wait_started().await;
        assert_eq!(router.context().unwrap().current_state, RouteState::Building);
        assert!(!router.is_locked());
        assert_eq!(router.pending_cancellations(), 3);

        let second = router.push(Route::new("/c", ["C"])).await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, NavigationOutcome::Superseded);
        assert_eq!(second, navigated("/c"));
        assert_eq!(
            factory.log().keys_for(WorkerOp::CancelBuild),
            vec!["B", "A", "T"]
        );
        for key in ["T", "A", "B"] {
            assert_eq!(factory.log().count(key, WorkerOp::CancelBuild), 1);
        }
        // the restart skipped the consent poll
        assert!(factory.log().keys_for(WorkerOp::RequestConsent).is_empty());
        assert_eq!(router.inflated_keys(), vec!["C"]);
        assert_eq!(router.current_url().as_deref(), Some("/c"));
        assert_eq!(router.pending_cancellations(), 0);
        assert_eq!(
            router.context().unwrap().path,
            vec![
                RouteState::Cancelled,
                RouteState::Consenting,
                RouteState::BuildStarting,
                RouteState::Building,
                RouteState::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_returning_to_current_url_cancels_running_build() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_build("B");
        let router = Arc::new(router(&factory));
        router.push(Route::new("/a", ["T", "A"])).await.unwrap();

        let deeper = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.push(Route::new("/a/b", ["T", "A", "B"])).await })
        };
        gate.wait_started().await;
        assert_eq!(router.current_url().as_deref(), Some("/a"));

        let returned = router.push(Route::new("/a", ["T", "A"])).await.unwrap();
        let deeper = deeper.await.unwrap().unwrap();

        assert_eq!(returned, navigated("/a"));
        assert_eq!(deeper, NavigationOutcome::Superseded);
        assert_eq!(factory.log().keys_for(WorkerOp::CancelBuild), vec!["B"]);
        assert_eq!(router.current_url().as_deref(), Some("/a"));
        assert_eq!(router.inflated_keys(), vec!["T", "A"]);
        assert!(router.history().back().is_empty());
        assert_eq!(router.pending_cancellations(), 0);
        assert_eq!(router.context().unwrap().current_state, RouteState::Complete);
    }

    #[tokio::test]
    async fn test_refresh_cancels_running_build_in_reverse_order() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_build("B");
        let router = Arc::new(router(&factory));
        router.push(Route::new("/s", ["S"])).await.unwrap();

        let first = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.push(Route::new("/b", ["T", "A", "B"])).await })
        };
        gate.wait_started().await;
        assert_eq!(router.pending_cancellations(), 3);

        let refreshed = router.refresh().await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first, NavigationOutcome::Superseded);
        assert_eq!(refreshed, navigated("/s"));
        assert_eq!(
            factory.log().keys_for(WorkerOp::CancelBuild),
            vec!["B", "A", "T"]
        );
        for key in ["T", "A", "B"] {
            assert_eq!(factory.log().count(key, WorkerOp::CancelBuild), 1);
        }
        assert_eq!(router.inflated_keys(), vec!["S"]);
        assert_eq!(factory.created("S").len(), 2);
        assert_eq!(router.current_url().as_deref(), Some("/s"));
        assert!(router.history().back().is_empty());
        assert_eq!(router.pending_cancellations(), 0);
        assert_eq!(
            router.context().unwrap().path,
            vec![
                RouteState::BuildStarting,
                RouteState::Building,
                RouteState::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_route_is_committed_before_engine_completes() {
        let factory = ScriptedWorkerFactory::new();
        let watcher = Arc::new(CompletionWatcher::default());
        let router = Arc::new(router(&factory).with_event_sink(watcher.clone()));
        *watcher.router.lock() = Some(Arc::downgrade(&router));

        router.push(Route::new("/a", ["T"])).await.unwrap();
        router.push(Route::new("/b", ["U"])).await.unwrap();

        assert_eq!(
            *watcher.seen.lock(),
            vec![Some("/a".to_string()), Some("/b".to_string())]
        );
        assert_eq!(router.history().back().len(), 1);
    }

    #[tokio::test]
    async fn test_denial_rolls_back_and_keeps_route() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        router.push(Route::new("/a", ["T", "A", "B"])).await.unwrap();
        factory.latest("A").unwrap().set_consent(Consent::deny());
        factory.log().clear();

        let outcome = router.push(Route::new("/c", ["C"])).await.unwrap();

        assert_eq!(
            outcome,
            NavigationOutcome::Denied(ConsentDenial {
                worker: "A".to_string(),
                reason: DenialReason::Refused,
            })
        );
        assert_eq!(factory.log().keys_for(WorkerOp::RequestConsent), vec!["B", "A"]);
        assert!(factory.log().keys_for(WorkerOp::Destroy).is_empty());
        assert!(factory.log().keys_for(WorkerOp::Build).is_empty());
        for key in ["T", "A", "B"] {
            assert_eq!(router.worker_status(key), Some(WorkerStatus::Running));
        }
        assert_eq!(router.current_url().as_deref(), Some("/a"));

        let context = router.context().unwrap();
        assert_eq!(context.current_state, RouteState::Complete);
        assert!(context.path.contains(&RouteState::ConsentDenied));
        assert!(!context.locked);
    }

    #[tokio::test]
    async fn test_navigation_rejected_while_consenting() {
        let factory = ScriptedWorkerFactory::new();
        let gate = factory.gate_consent("T");
        let router = Arc::new(router(&factory));
        router.push(Route::new("/a", ["T"])).await.unwrap();

        let pending = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.push(Route::new("/b", ["U"])).await })
        };
        gate.wait_started().await;
        assert!(router.is_locked());

        let rejected = router.push(Route::new("/c", ["V"])).await.unwrap();
        assert_eq!(rejected, NavigationOutcome::Rejected);

        gate.release();
        assert_eq!(pending.await.unwrap().unwrap(), navigated("/b"));
        assert!(factory.created("V").is_empty());
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_without_consent() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        router.push(Route::new("/a", ["T", "A"])).await.unwrap();
        factory.log().clear();

        let outcome = router.refresh().await.unwrap();

        assert_eq!(outcome, navigated("/a"));
        assert!(factory.log().keys_for(WorkerOp::RequestConsent).is_empty());
        assert_eq!(factory.log().keys_for(WorkerOp::Destroy), vec!["T", "A"]);
        assert_eq!(factory.log().keys_for(WorkerOp::Build), vec!["T", "A"]);
        assert!(router.history().back().is_empty());
        assert_eq!(factory.created("T").len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_before_any_navigation() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        assert_eq!(router.refresh().await.unwrap(), NavigationOutcome::Unchanged);
        assert!(router.context().is_none());
    }

    #[tokio::test]
    async fn test_build_failure_unwinds_started_workers() {
        let factory = ScriptedWorkerFactory::new();
        factory.fail_build("B", "template missing");
        let router = router(&factory);

        let outcome = router.push(Route::new("/a/b", ["T", "A", "B"])).await.unwrap();

        match outcome {
            NavigationOutcome::Failed { worker, error } => {
                assert_eq!(worker, "B");
                assert!(error.contains("template missing"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            factory.log().keys_for(WorkerOp::CancelBuild),
            vec!["B", "A", "T"]
        );
        assert!(router.inflated_keys().is_empty());
        assert_eq!(router.current_url(), None);
        assert!(!router.is_locked());

        let retry = router.push(Route::new("/x", ["X"])).await.unwrap();
        assert_eq!(retry, navigated("/x"));
    }

    #[tokio::test]
    async fn test_unknown_worker_key_fails_navigation() {
        let factory = ScriptedWorkerFactory::new();
        factory.reject_key("ghost");
        let router = router(&factory);

        let outcome = router.push(Route::new("/g", ["T", "ghost"])).await.unwrap();

        assert!(matches!(
            outcome,
            NavigationOutcome::Failed { ref worker, .. } if worker == "ghost"
        ));
        assert_eq!(factory.log().keys_for(WorkerOp::CancelBuild), vec!["T"]);
    }

    #[tokio::test]
    async fn test_same_route_is_unchanged() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        router.push(Route::new("/a", ["T", "A"])).await.unwrap();
        factory.log().clear();

        let outcome = router.push(Route::new("/a", ["T", "A"])).await.unwrap();

        assert_eq!(outcome, NavigationOutcome::Unchanged);
        assert!(factory.log().calls().is_empty());
    }

    #[tokio::test]
    async fn test_replace_does_not_record_history() {
        let factory = ScriptedWorkerFactory::new();
        let router = router(&factory);
        router.push(Route::new("/a", ["T"])).await.unwrap();

        router.replace(Route::new("/b", ["U"])).await.unwrap();

        assert!(router.history().back().is_empty());
        assert_eq!(router.current_url().as_deref(), Some("/b"));
    }

    #[tokio::test]
    async fn test_history_limit_applies() {
        let factory = ScriptedWorkerFactory::new();
        let router = Router::new(
            factory.clone(),
            RouterConfig::new().with_history_limit(2),
        )
        .unwrap();

        for url in ["/1", "/2", "/3", "/4"] {
            router.push(Route::new(url, [url])).await.unwrap();
        }

        let back: Vec<_> = router
            .history()
            .back()
            .iter()
            .map(|entry| entry.url().to_string())
            .collect();
        assert_eq!(back, vec!["/2", "/3"]);
    }

    #[tokio::test]
    async fn test_routers_are_independent() {
        let left_factory = ScriptedWorkerFactory::new();
        let right_factory = ScriptedWorkerFactory::new();
        let left = router(&left_factory);
        let right = router(&right_factory);

        let (l, r) = tokio::join!(
            left.push(Route::new("/left", ["L"])),
            right.push(Route::new("/right", ["R"]))
        );

        assert_eq!(l.unwrap(), navigated("/left"));
        assert_eq!(r.unwrap(), navigated("/right"));
        assert!(left_factory.created("R").is_empty());
        assert_eq!(right.inflated_keys(), vec!["R"]);
    }

    #[tokio::test]
    async fn test_router_reports_events() {
        let factory = ScriptedWorkerFactory::new();
        let sink = Arc::new(CollectingEventSink::new());
        let router = router(&factory).with_event_sink(sink.clone());

        router.push(Route::new("/a", ["T"])).await.unwrap();

        let types = sink.event_types();
        assert_eq!(types.first().map(String::as_str), Some(kinds::BUILD_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(kinds::BUILD_COMPLETED));
        let started = sink.events_of_type(kinds::BUILD_STARTED)[0].clone().unwrap();
        assert_eq!(started["build_id"], "router");
        assert_eq!(started["state"], "consenting");
    }

    #[test]
    fn test_rejects_invalid_config() {
        let factory = ScriptedWorkerFactory::new();
        let err = Router::new(factory, RouterConfig::new().with_history_limit(0)).unwrap_err();
        assert!(err.to_string().contains("history_limit"));
    }
}
