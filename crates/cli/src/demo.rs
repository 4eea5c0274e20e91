//! A self-contained "daily reward" operation driven against a simulated screen.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use engine::{Edge, EngineError, Graph, Handler, Node, Operation, OperationConfig};
use nodes::{
    AreaLocator, AreaPresence, Category, ClickOutcome, NodeError, NodeHandler, Reply, RoundContext,
    RoundOutcome, Screenshot,
};

const HOME: &str = "home";
const REWARDS: &str = "rewards";
const CLAIMED: &str = "claimed";
const CLAIM_MISSING: &str = "claim_missing";

struct ScreenState {
    current: &'static str,
    claim_misses: u32,
}

/// Pretend UI: tracks which screen is showing and misses the claim button a
/// configurable number of times before it "appears".
pub struct SimulatedScreen {
    state: Mutex<ScreenState>,
}

impl SimulatedScreen {
    pub fn new(claim_misses: u32) -> Self {
        Self {
            state: Mutex::new(ScreenState {
                current: "splash",
                claim_misses,
            }),
        }
    }

    pub fn capture(&self) -> anyhow::Result<Screenshot> {
        Ok(Screenshot::blank(320, 180))
    }

    fn known(screen_name: &str, area_name: &str) -> bool {
        matches!(
            (screen_name, area_name),
            (_, "home_button") | (HOME, "menu") | (HOME, "rewards_tab") | (REWARDS, "claim") | (REWARDS, "mail")
        )
    }
}

#[async_trait]
impl AreaLocator for SimulatedScreen {
    async fn find_and_click_area(&self, _screen: &Screenshot, screen_name: &str, area_name: &str) -> ClickOutcome {
        if !Self::known(screen_name, area_name) {
            return ClickOutcome::AreaUnconfigured;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if area_name == "home_button" {
            state.current = HOME;
            return ClickOutcome::Clicked;
        }
        if state.current != screen_name {
            return ClickOutcome::NotFound;
        }
        match area_name {
            "rewards_tab" => state.current = REWARDS,
            "claim" if state.claim_misses > 0 => {
                state.claim_misses -= 1;
                return ClickOutcome::NotFound;
            }
            _ => {}
        }
        ClickOutcome::Clicked
    }

    async fn find_area(&self, _screen: &Screenshot, screen_name: &str, area_name: &str) -> AreaPresence {
        if !Self::known(screen_name, area_name) {
            return AreaPresence::Unconfigured;
        }
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.current == screen_name {
            AreaPresence::Present
        } else {
            AreaPresence::Absent
        }
    }
}

/// Clicks the claim button, reporting how many rounds it took.
struct ClaimReward {
    rounds: AtomicU32,
}

#[async_trait]
impl NodeHandler for ClaimReward {
    async fn run(&self, round: &RoundContext) -> Result<RoundOutcome, NodeError> {
        let rounds = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        let clicked = round
            .click_area(REWARDS, "claim", Reply::new().pad_to(Duration::from_millis(150)))
            .await;
        Ok(match clicked.category {
            Category::Success => clicked.with_status(CLAIMED).with_payload(json!({ "rounds": rounds })),
            _ => clicked.with_status(CLAIM_MISSING),
        })
    }
}

fn collect_mail() -> Result<Operation, EngineError> {
    let graph = Graph::builder()
        .add_node(Node::new(
            "open_mail",
            Handler::inline(|round| async move {
                Ok(round.click_area(REWARDS, "mail", Reply::new()).await)
            }),
        ))
        .add_node(Node::new(
            "collect_all",
            Handler::inline(|round| async move {
                Ok(round
                    .success(Reply::new().payload(json!({ "items": 3 })).wait_for(Duration::from_millis(100)))
                    .await)
            }),
        ))
        .add_edge(Edge::success("open_mail", "collect_all"))
        .build()?;

    Ok(Operation::new("collect_mail", graph).with_config(OperationConfig {
        max_retries: 2,
        ..OperationConfig::default()
    }))
}

/// Build the demonstration operation.
pub fn daily_reward(config: OperationConfig, node_timeout: Option<Duration>) -> Result<Operation, EngineError> {
    let mut claim = Node::new(
        "claim",
        Handler::bound(Arc::new(ClaimReward {
            rounds: AtomicU32::new(0),
        })),
    );
    if let Some(timeout) = node_timeout {
        claim = claim.with_timeout(timeout);
    }

    let graph = Graph::builder()
        .add_node(Node::new(
            "open_rewards",
            Handler::inline(|round| async move {
                Ok(round
                    .click_area(HOME, "rewards_tab", Reply::new().pad_to(Duration::from_millis(200)))
                    .await)
            }),
        ))
        .add_node(claim)
        .add_node(
            Node::new("collect", Handler::sub_graph_retrying(collect_mail()?))
                .with_timeout(Duration::from_secs(10)),
        )
        .add_node(Node::new(
            "report_missing",
            Handler::inline(|round| async move {
                Ok(round.fail(Reply::new().status("claim_unavailable")).await)
            }),
        ))
        .add_edge(Edge::success("open_rewards", "claim"))
        .add_edge(Edge::success("claim", "collect").with_status(CLAIMED))
        .add_edge(Edge::failure("claim", "report_missing"))
        .readiness_guard(
            Handler::inline(|round| async move {
                let seen = round.check_area(HOME, "menu", Reply::new()).await;
                // Hand over to make_ready at once instead of retrying on the wrong screen.
                Ok(match seen.category {
                    Category::Retry => seen.into_failure(),
                    _ => seen,
                })
            }),
            Handler::inline(|round| async move {
                Ok(round
                    .click_area("splash", "home_button", Reply::new().wait_for(Duration::from_millis(100)))
                    .await)
            }),
        )
        .build()?;

    Ok(Operation::new("daily_reward", graph).with_config(config))
}
