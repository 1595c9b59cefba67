use std::time::Duration;

use enrollment_service::{
    config::EnvVars,
    tasks::{reconcile_enrolled_courses, report_expiring_enrollments},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(sentry::integrations::tracing::layer())
        .with(EnvFilter::from_default_env())
        .init();
    tracing::info!("Starting enrollment maintenance service...");
    dotenvy::dotenv().ok();

    let env_vars = EnvVars::new();
    tracing::info!(environment = %env_vars.environment, "configuration loaded");

    let _guard = if let Some(sentry_dsn) = env_vars.sentry_dsn.clone() {
        tracing::info!("initializing Sentry");
        // NOTE: Events are only emitted, once the guard goes out of scope.
        Some(sentry::init((
            sentry_dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        )))
    } else {
        None
    };

    let run = async {
        if let Err(e) = reconcile_enrolled_courses(&env_vars).await {
            tracing::error!("Error reconciling enrolled course lists: {:?}", e);
        } else {
            tracing::info!("Successfully reconciled enrolled course lists");
        }

        if let Err(e) = report_expiring_enrollments(&env_vars).await {
            tracing::error!("Error reporting expiring enrollments: {:?}", e);
        } else {
            tracing::info!("Successfully reported expiring enrollments");
        }
    };

    match env_vars.timeout_secs {
        Some(secs) => {
            if tokio::time::timeout(Duration::from_secs(secs), run)
                .await
                .is_err()
            {
                tracing::error!("maintenance run exceeded {secs}s timeout");
            }
        }
        None => run.await,
    }
}
