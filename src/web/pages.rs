//! HTML for the standalone login page

use crate::gateway::LoginFailure;

/// Human text for the `error=` codes the callback redirects with
pub fn failure_message(code: &str) -> Option<&'static str> {
    if code == LoginFailure::DiscordAuthFailed.code() {
        Some("Discord sign-in was cancelled or could not be verified. Please try again.")
    } else if code == LoginFailure::AccountSetupFailed.code() {
        Some("We could not set up your panel account. Make sure your Discord account has a verified email, then try again.")
    } else {
        None
    }
}

/// Login page HTML
pub fn login_page(error_code: Option<&str>) -> String {
    let error_html = error_code
        .and_then(failure_message)
        .map(|msg| format!(r#"<p class="error">{}</p>"#, msg))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Login - Panel</title>
    <style>
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            color: #fff;
        }}
        .container {{
            background: rgba(255,255,255,0.05);
            border-radius: 16px;
            padding: 3rem;
            text-align: center;
            border: 1px solid rgba(255,255,255,0.1);
            max-width: 400px;
            width: 90%;
        }}
        h1 {{ font-size: 1.8rem; margin-bottom: 0.5rem; }}
        p {{ color: #a0a0a0; margin-bottom: 2rem; }}
        .error {{ color: #e74c3c; }}
        .discord-btn {{
            display: inline-block;
            background: #5865F2;
            color: white;
            text-decoration: none;
            padding: 1rem 2rem;
            border-radius: 8px;
            font-weight: 600;
        }}
        .discord-btn:hover {{ background: #4752c4; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Panel</h1>
        {error_html}
        <p>Sign in with Discord. A panel account is created for you on first login.</p>
        <a href="/login/discord" class="discord-btn">Login with Discord</a>
    </div>
</body>
</html>"#,
        error_html = error_html
    )
}
