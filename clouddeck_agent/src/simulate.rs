//! Background simulator: feeds the hub with fake dashboard pushes so the
//! watcher has something to show without a real platform behind it.

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::state::AppState;

const DEPLOY_STATUSES: [&str; 4] = ["building", "running", "success", "failed"];
const ALERT_SEVERITIES: [&str; 3] = ["info", "warning", "critical"];
const PLATFORM_STATUSES: [&str; 4] = ["operational", "operational", "degraded", "maintenance"];

pub fn spawn_simulator(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick: u64 = 0;
        loop {
            tick += 1;
            let now = chrono::Utc::now();

            state.publish(
                "metrics:demo",
                json!({
                    "cpu": (tick * 7) % 100,
                    "memory": 30 + (tick * 13) % 60,
                    "requestsPerMinute": 40 + (tick * 3) % 25,
                }),
            );

            state.publish(
                "logs:dep-demo",
                json!({
                    "id": tick,
                    "timestamp": now,
                    "level": if tick % 10 == 0 { "error" } else { "info" },
                    "message": format!("worker heartbeat #{tick}"),
                }),
            );

            if tick % 5 == 0 {
                let n = (tick / 5) % 8;
                state.publish(
                    "deployments",
                    json!({
                        "id": format!("dep-{n}"),
                        "name": format!("app-{n}"),
                        "status": DEPLOY_STATUSES[(tick / 5) as usize % DEPLOY_STATUSES.len()],
                        "createdAt": now,
                    }),
                );
            }

            if tick % 12 == 0 {
                state.publish(
                    "alerts",
                    json!({
                        "id": format!("alert-{tick}"),
                        "severity": ALERT_SEVERITIES[(tick / 12) as usize % ALERT_SEVERITIES.len()],
                        "message": "simulated alert",
                        "createdAt": now,
                    }),
                );
            }

            if tick % 20 == 0 {
                state.publish(
                    "system-status",
                    json!({
                        "status": PLATFORM_STATUSES[(tick / 20) as usize % PLATFORM_STATUSES.len()],
                        "services": { "api": "up", "builds": "up" },
                    }),
                );
            }

            sleep(period).await;
        }
    })
}
