//! Selection Flow Scenarios
//!
//! Drives the controller through complete random and AI flows on a paused
//! clock, with a scripted recommendation service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use green_fc_lunch::config::{AiFailurePolicy, SelectionConfig};
use green_fc_lunch::menu::Catalog;
use green_fc_lunch::recommend::{RecommendError, Recommendation, RecommendationProvider};
use green_fc_lunch::selection::{
    PickSource, SelectionController, SelectionError, SelectionSnapshot, SelectionState,
    DEFAULT_CONDITION, FALLBACK_REASON, LUCKY_REASON,
};

#[derive(Clone)]
enum Reply {
    Menu(&'static str, &'static str),
    Fail,
    Garbage,
}

struct ScriptedProvider {
    reply: Reply,
    delay: Duration,
    seen: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(reply: Reply) -> Arc<Self> {
        Self::slow(reply, Duration::ZERO)
    }

    fn slow(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self { reply, delay, seen: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl RecommendationProvider for ScriptedProvider {
    async fn recommend(&self, condition: &str) -> Result<Recommendation, RecommendError> {
        self.seen.lock().unwrap().push(condition.to_string());
        tokio::time::sleep(self.delay).await;
        match self.reply.clone() {
            Reply::Menu(name, reason) => Ok(Recommendation {
                menu_name: name.to_string(),
                reason: reason.to_string(),
            }),
            Reply::Fail => Err(RecommendError::Status { status: 503, body: "unavailable".into() }),
            Reply::Garbage => Err(RecommendError::Malformed("not JSON".into())),
        }
    }
}

fn controller_with(config: SelectionConfig) -> SelectionController {
    SelectionController::with_seed(Arc::new(Catalog::green_fc()), config, 2024)
}

fn controller() -> SelectionController {
    controller_with(SelectionConfig::default())
}

/// Collects transitions until one matches, returning everything seen.
async fn collect_until<F>(
    events: &mut broadcast::Receiver<SelectionSnapshot>,
    mut done: F,
) -> Vec<SelectionSnapshot>
where
    F: FnMut(&SelectionSnapshot) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let snapshot = events.recv().await.expect("event stream closed");
        let finished = done(&snapshot);
        seen.push(snapshot);
        if finished {
            return seen;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_random_pick_always_lands_on_catalog_item() {
    let controller = controller();
    let catalog = Catalog::green_fc();

    for _ in 0..5 {
        let mut events = controller.subscribe();
        let invocation = controller.start_random_pick().await;
        let seen = collect_until(&mut events, |s| s.invocation == invocation && s.state.is_result()).await;

        match &seen.last().unwrap().state {
            SelectionState::Result { item, reason, source, .. } => {
                assert!(catalog.contains_id(&item.id));
                assert_eq!(reason, LUCKY_REASON);
                assert_eq!(*source, PickSource::Random);
            }
            other => panic!("unexpected state {:?}", other),
        }
        controller.reset().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_ai_match_passes_through_unchanged() {
    let controller = controller();
    controller
        .set_provider(Some(ScriptedProvider::new(Reply::Menu("김치찌개", "test-reason"))))
        .await;

    let mut events = controller.subscribe();
    controller.start_ai_recommendation("비가 와요").await.unwrap();
    let seen = collect_until(&mut events, |s| s.state.is_result()).await;

    assert_eq!(seen[0].state, SelectionState::AiThinking);
    match &seen.last().unwrap().state {
        SelectionState::Result { item, reason, source, .. } => {
            assert_eq!(item.id, "kimchi");
            assert_eq!(item.name, "김치찌개");
            assert_eq!(reason, "test-reason");
            assert_eq!(*source, PickSource::Ai);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_off_menu_answer_degrades_to_spin() {
    let controller = controller();
    controller
        .set_provider(Some(ScriptedProvider::new(Reply::Menu("피자", "치즈가 최고"))))
        .await;

    let mut events = controller.subscribe();
    controller.start_ai_recommendation("").await.unwrap();
    let seen = collect_until(&mut events, |s| s.state.is_result()).await;

    assert!(seen
        .iter()
        .any(|s| s.state == SelectionState::RandomSpinning { tick: 0 }));
    match &seen.last().unwrap().state {
        SelectionState::Result { item, reason, source, .. } => {
            assert!(Catalog::green_fc().contains_id(&item.id));
            assert_ne!(item.name, "피자");
            assert_eq!(reason, LUCKY_REASON);
            assert_eq!(*source, PickSource::Fallback);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_garbage_payload_degrades_to_spin() {
    let controller = controller();
    controller.set_provider(Some(ScriptedProvider::new(Reply::Garbage))).await;

    let mut events = controller.subscribe();
    controller.start_ai_recommendation("배고파").await.unwrap();
    let seen = collect_until(&mut events, |s| s.state.is_result()).await;

    assert!(seen.iter().all(|s| !matches!(s.state, SelectionState::Error { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_failure_shows_error_then_recovers() {
    let controller = controller();
    controller.set_provider(Some(ScriptedProvider::new(Reply::Fail))).await;

    let mut events = controller.subscribe();
    controller.start_ai_recommendation("피곤함").await.unwrap();

    let seen = collect_until(&mut events, |s| s.state.is_idle()).await;
    let modes: Vec<_> = seen.iter().map(|s| s.state.mode()).collect();
    assert_eq!(modes, vec!["ai_thinking", "error", "idle"]);

    assert!(!controller.has_pending_timer().await);
    // Retry is possible right away
    controller.start_ai_recommendation("다시").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failure_with_random_fallback_policy() {
    let controller = controller_with(SelectionConfig {
        failure_policy: AiFailurePolicy::RandomFallback,
        ..SelectionConfig::default()
    });
    controller.set_provider(Some(ScriptedProvider::new(Reply::Fail))).await;

    let mut events = controller.subscribe();
    controller.start_ai_recommendation("피곤함").await.unwrap();
    let seen = collect_until(&mut events, |s| s.state.is_result()).await;

    match &seen.last().unwrap().state {
        SelectionState::Result { item, reason, source, .. } => {
            assert!(Catalog::green_fc().contains_id(&item.id));
            assert_eq!(reason, FALLBACK_REASON);
            assert_eq!(*source, PickSource::Fallback);
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_blank_condition_uses_default_phrase() {
    let controller = controller();
    let provider = ScriptedProvider::new(Reply::Menu("동태탕", "시원하게"));
    controller.set_provider(Some(provider.clone())).await;

    let mut events = controller.subscribe();
    controller.start_ai_recommendation("   ").await.unwrap();
    collect_until(&mut events, |s| s.state.is_result()).await;
    controller.reset().await.unwrap();

    controller.start_ai_recommendation("  비 오는 날  ").await.unwrap();
    collect_until(&mut events, |s| s.state.is_result()).await;

    let seen = provider.seen.lock().unwrap().clone();
    assert_eq!(seen, vec![DEFAULT_CONDITION.to_string(), "비 오는 날".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_ai_without_credential_is_refused() {
    let controller = controller();
    assert_eq!(
        controller.start_ai_recommendation("비").await,
        Err(SelectionError::MissingCredential)
    );
    assert_eq!(controller.state().await, SelectionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_no_duplicate_requests_while_thinking() {
    let controller = controller();
    let provider = ScriptedProvider::slow(Reply::Menu("김치찌개", "r"), Duration::from_secs(3));
    controller.set_provider(Some(provider.clone())).await;

    controller.start_ai_recommendation("a").await.unwrap();
    assert_eq!(
        controller.start_ai_recommendation("b").await,
        Err(SelectionError::Busy)
    );
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(provider.seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restarting_spin_leaves_one_ticker() {
    let controller = controller();
    let mut events = controller.subscribe();

    let first = controller.start_random_pick().await;
    tokio::time::sleep(Duration::from_millis(480)).await;
    let second = controller.start_random_pick().await;

    let seen = collect_until(&mut events, |s| s.invocation == second && s.state.is_result()).await;

    let restart_at = seen
        .iter()
        .position(|s| s.invocation == second)
        .unwrap();
    assert!(seen[restart_at..].iter().all(|s| s.invocation != first));

    let ticks: Vec<u32> = seen[restart_at..]
        .iter()
        .filter_map(|s| match s.state {
            SelectionState::RandomSpinning { tick } => Some(tick),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, (0..=12).collect::<Vec<_>>());

    assert!(!controller.has_pending_timer().await);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn test_stale_recommendation_is_discarded() {
    let controller = controller();
    let provider = ScriptedProvider::slow(Reply::Menu("김치찌개", "늦은 답변"), Duration::from_secs(5));
    controller.set_provider(Some(provider)).await;

    let stale = controller.start_ai_recommendation("천천히").await.unwrap();
    controller.cancel().await;

    let mut events = controller.subscribe();
    let fresh = controller.start_random_pick().await;
    collect_until(&mut events, |s| s.invocation == fresh && s.state.is_result()).await;

    tokio::time::sleep(Duration::from_secs(10)).await;

    match controller.state().await {
        SelectionState::Result { reason, source, .. } => {
            assert_eq!(reason, LUCKY_REASON);
            assert_eq!(source, PickSource::Random);
        }
        other => panic!("unexpected state {:?}", other),
    }
    while let Ok(event) = events.try_recv() {
        assert_ne!(event.invocation, stale);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_spin() {
    let controller = controller();
    controller.start_random_pick().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    controller.cancel().await;
    assert!(!controller.has_pending_timer().await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.state, SelectionState::Idle);
    assert!(snapshot.selected_id.is_none());
}
