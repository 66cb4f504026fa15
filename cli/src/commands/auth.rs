use scribo_client::LoopbackFlow;
use scribo_client::config::config_dir;
use serde_json::json;

use crate::util::{Context, print_error, print_json};

pub async fn login(ctx: &Context, client_id: &str, authorize_url: &str, no_browser: bool) -> i32 {
    let mut flow = LoopbackFlow::new(client_id).with_authorize_url(authorize_url);
    if no_browser {
        flow = flow.without_browser();
    }

    match ctx.session.login(&flow).await {
        Some(user) => print_json(&json!({
            "status": "authenticated",
            "user": user,
            "config_path": config_dir().to_string_lossy()
        })),
        None => print_error(
            1,
            "auth_error",
            "Login failed",
            Some("See the log output above, or rerun with RUST_LOG=debug."),
        ),
    }
}

pub async fn logout(ctx: &Context) -> i32 {
    let invalidation = ctx.session.logout();
    // the process exits right after this, so let the server hear about it first
    if let Err(e) = invalidation.await {
        tracing::warn!(error = %e, "Session invalidation task failed");
    }
    print_json(&json!({
        "status": "logged_out",
        "config_path": config_dir().to_string_lossy()
    }))
}

pub async fn whoami(ctx: &Context) -> i32 {
    let state = ctx.session.bootstrap().await;
    ctx.session.settle().await;
    let code = print_json(&state);
    if code == 0 && state.user.is_none() { 1 } else { code }
}
