//! Green FC Lunch Manager
//!
//! `green_fc_lunch serve` runs the HTTP API; without arguments an interactive
//! console drives the same session.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use green_fc_lunch::selection::{PickSource, SelectionSnapshot};
use green_fc_lunch::{server, AppConfig, LunchApp, SelectionState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("green_fc_lunch=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config = AppConfig::from_env();
    let bind = config.bind.clone();
    let app = LunchApp::new(config).await?;

    match std::env::args().nth(1).as_deref() {
        Some("serve") => server::run_server(app, &bind).await,
        Some(other) => anyhow::bail!("unknown command '{}' (expected 'serve')", other),
        None => run_console(app).await,
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// CONSOLE
// ──────────────────────────────────────────────────────────────────────────────

async fn run_console(app: Arc<LunchApp>) -> Result<()> {
    println!("\n{}", "═".repeat(50));
    println!("⚽ Green FC · Lunch Manager Pro");
    println!("{}", "═".repeat(50));
    if !app.has_credential().await {
        println!("🔑 No API key yet. Use 'key <API_KEY>' to enable the AI coach.");
    }
    println!("💡 Commands: menu | random | ai <상황> | + <id> | - <id> | orders | order | reset | clear | key <k> | logout | quit\n");

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        stdout.write_all("🍲 > ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let (command, arg) = input.split_once(' ').unwrap_or((input, ""));
        let arg = arg.trim();

        match command {
            "quit" | "exit" | "q" => {
                println!("\n👋 맛있게 드세요!\n");
                break;
            }
            "menu" => {
                for item in app.catalog().items() {
                    println!("  [{}] {} · {}", item.id, item.name, item.tags.join(" "));
                }
            }
            "random" => {
                app.selection().start_random_pick().await;
                follow_selection(&app).await;
            }
            "ai" => match app.selection().start_ai_recommendation(arg).await {
                Ok(_) => {
                    println!("🤔 AI 코치가 고민 중...");
                    follow_selection(&app).await;
                }
                Err(e) => println!("⚠️  {}", e),
            },
            "+" => match app.increment(arg).await {
                Ok(count) => println!("➕ {} × {}", arg, count),
                Err(e) => println!("⚠️  {}", e),
            },
            "-" => match app.decrement(arg).await {
                Ok(count) => println!("➖ {} × {}", arg, count),
                Err(e) => println!("⚠️  {}", e),
            },
            "orders" => print_orders(&app).await,
            "order" => match app.order_result().await {
                Ok(_) => print_orders(&app).await,
                Err(e) => println!("⚠️  {}", e),
            },
            "reset" => {
                if let Err(e) = app.selection().reset().await {
                    println!("⚠️  {}", e);
                }
            }
            "clear" => {
                stdout.write_all("주문 내역을 모두 지우시겠습니까? [y/N] ".as_bytes()).await?;
                stdout.flush().await?;
                let answer = lines.next_line().await?.unwrap_or_default();
                let confirmed = matches!(answer.trim(), "y" | "Y" | "yes");
                match app.clear_orders(confirmed).await {
                    Ok(()) => println!("🗑️  Orders cleared."),
                    Err(e) => println!("↩️  {}", e),
                }
            }
            "key" => match app.set_api_key(arg).await {
                Ok(()) => println!("✅ API key verified. AI coach ready."),
                Err(e) => println!("❌ {}", e),
            },
            "logout" => {
                app.logout().await?;
                println!("🚪 Logged out. Orders and key cleared.");
            }
            _ => println!("❓ Unknown command '{}'", command),
        }
    }

    Ok(())
}

/// Prints spin ticks until the selection settles or returns to idle.
async fn follow_selection(app: &LunchApp) {
    let mut rx = app.selection().watch();
    loop {
        let snapshot: SelectionSnapshot = rx.borrow_and_update().clone();
        match &snapshot.state {
            SelectionState::RandomSpinning { tick } => {
                if let Some(item) = snapshot.selected_id.as_deref().and_then(|id| app.catalog().find_by_id(id)) {
                    println!("  🎲 {:>2} · {}", tick, item.name);
                }
            }
            SelectionState::Result { item, reason, source, .. } => {
                let badge = match source {
                    PickSource::Ai => "🤖 AI 추천",
                    PickSource::Random => "🍀 행운의 메뉴",
                    PickSource::Fallback => "🎲 대체 추천",
                };
                println!("\n{} → {}", badge, item.name);
                println!("{}", "─".repeat(50));
                println!("{}", reason);
                println!("{}", "─".repeat(50));
                println!("💡 'order' to add it, 'reset' to dismiss.\n");
                return;
            }
            SelectionState::Error { message } => println!("❌ {}", message),
            SelectionState::Idle => return,
            SelectionState::AiThinking => {}
        }

        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn print_orders(app: &LunchApp) {
    let summary = app.orders().await;
    if summary.total == 0 {
        println!("📭 아직 주문이 없습니다.");
        return;
    }
    println!("\n🧾 주문 현황");
    for line in &summary.lines {
        println!("  {:<8} {:>3}", line.item.name, line.count);
    }
    println!("  {}", "─".repeat(14));
    println!("  합계     {:>3}개\n", summary.total);
}
