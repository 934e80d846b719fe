//! HTML pages: home/login, consent and client creation.
//!
//! Every interpolated value is HTML-escaped.

use crate::models::{Client, Scope, User};
use crate::oauth::ValidatedRequest;

const STYLE: &str = r#"<style>
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background: #f5f5f5; margin: 0; display: flex; justify-content: center; padding: 48px 16px; }
.card { background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 32px; max-width: 560px; width: 100%; }
h1 { font-size: 20px; margin: 0 0 8px; color: #333; }
.subtitle { color: #666; font-size: 14px; margin: 0 0 24px; }
label { display: block; font-size: 14px; font-weight: 500; margin: 12px 0 6px; color: #333; }
input[type="text"], textarea, select { width: 100%; padding: 10px; border: 1px solid #ddd; border-radius: 4px; font-size: 14px; box-sizing: border-box; }
button { padding: 10px 16px; background: #4a90d9; color: #fff; border: none; border-radius: 4px; font-size: 14px; font-weight: 500; cursor: pointer; margin-top: 16px; }
button.secondary { background: #999; }
.error { background: #fee; border: 1px solid #c00; color: #c00; padding: 10px; border-radius: 4px; margin-bottom: 16px; }
pre { background: #f7f7f7; padding: 12px; border-radius: 4px; overflow-x: auto; font-size: 13px; }
</style>"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>{title}</title>
{STYLE}
</head>
<body>
<div class="card">
{body}
</div>
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn error_banner(error_message: Option<&str>) -> String {
    error_message
        .map(|msg| format!(r#"<div class="error">{}</div>"#, html_escape(msg)))
        .unwrap_or_default()
}

/// Home page: a login form, or the signed-in user and their clients.
pub fn render_home(user: Option<&User>, clients: &[Client], error_message: Option<&str>) -> String {
    let error_html = error_banner(error_message);
    let Some(user) = user else {
        return layout(
            "Sign in",
            &format!(
                r#"<h1>OAuth2 Authorization Server</h1>
<p class="subtitle">Sign in with any username; new users are created on first login.</p>
{error_html}
<form method="POST" action="/">
<label for="username">Username</label>
<input type="text" id="username" name="username" required autofocus>
<button type="submit">Sign in</button>
</form>"#
            ),
        );
    };

    let client_list: String = clients.iter().map(render_client).collect();
    let client_list = if client_list.is_empty() {
        "<p>No clients yet.</p>".to_string()
    } else {
        client_list
    };

    layout(
        "Home",
        &format!(
            r#"<h1>Signed in as {username}</h1>
<p class="subtitle"><a href="/logout">Log out</a> &middot; <a href="/create_client">Create client</a></p>
{error_html}
{client_list}"#,
            username = html_escape(&user.username),
        ),
    )
}

fn render_client(client: &Client) -> String {
    let metadata = &client.metadata;
    let grant_types: Vec<&str> = metadata.grant_types.iter().map(|g| g.as_str()).collect();
    format!(
        "<pre>client_id: {id}\nclient_secret: {secret}\nclient_name: {name}\nredirect_uris: {uris}\n\
         grant_types: {grants}\nscope: {scope}\ntoken_endpoint_auth_method: {method}</pre>\n",
        id = html_escape(&client.client_id),
        secret = html_escape(client.client_secret().unwrap_or("(none)")),
        name = html_escape(&metadata.client_name),
        uris = html_escape(&metadata.redirect_uris.join(" ")),
        grants = html_escape(&grant_types.join(" ")),
        scope = html_escape(&metadata.scope.to_string()),
        method = metadata.token_endpoint_auth_method.as_str(),
    )
}

/// Consent page. Without a signed-in user it also asks for a username.
pub fn render_consent(request: &ValidatedRequest, user: Option<&User>) -> String {
    let hidden: String = request
        .request
        .pairs()
        .into_iter()
        .map(|(name, value)| {
            format!(r#"<input type="hidden" name="{name}" value="{}">"#, html_escape(value)) + "\n"
        })
        .collect();

    let identity = match user {
        Some(user) => format!(
            r#"<p class="subtitle">Signed in as <strong>{}</strong></p>"#,
            html_escape(&user.username)
        ),
        None => r#"<label for="username">Username</label>
<input type="text" id="username" name="username" required autofocus>"#
            .to_string(),
    };

    let scopes = scope_list(&request.scope);

    layout(
        "Authorize",
        &format!(
            r#"<h1>Authorize {client_name}</h1>
<p class="subtitle">The application is requesting: {scopes}</p>
<form method="POST" action="/oauth/authorize">
{hidden}{identity}
<button type="submit" name="confirm" value="yes">Allow</button>
<button type="submit" name="confirm" value="no" class="secondary">Deny</button>
</form>"#,
            client_name = html_escape(&request.client.metadata.client_name),
        ),
    )
}

fn scope_list(scope: &Scope) -> String {
    if scope.is_empty() {
        return "<em>no scope</em>".to_string();
    }
    scope
        .iter()
        .map(|token| format!("<strong>{}</strong>", html_escape(token)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Client creation form.
pub fn render_create_client(scopes_supported: &Scope, error_message: Option<&str>) -> String {
    let error_html = error_banner(error_message);
    layout(
        "Create client",
        &format!(
            r#"<h1>Create client</h1>
<p class="subtitle"><a href="/">Back</a></p>
{error_html}
<form method="POST" action="/create_client">
<label for="client_name">Client name</label>
<input type="text" id="client_name" name="client_name" required>
<label for="client_uri">Client URI</label>
<input type="text" id="client_uri" name="client_uri">
<label for="redirect_uris">Redirect URIs (one per line)</label>
<textarea id="redirect_uris" name="redirect_uris" rows="3"></textarea>
<label for="grant_types">Grant types (one per line)</label>
<textarea id="grant_types" name="grant_types" rows="3">authorization_code</textarea>
<label for="response_types">Response types (one per line)</label>
<textarea id="response_types" name="response_types" rows="2">code</textarea>
<label for="scope">Allowed scope (supported: {supported})</label>
<input type="text" id="scope" name="scope">
<label for="token_endpoint_auth_method">Token endpoint auth method</label>
<select id="token_endpoint_auth_method" name="token_endpoint_auth_method">
<option value="client_secret_basic">client_secret_basic</option>
<option value="client_secret_post">client_secret_post</option>
<option value="none">none</option>
</select>
<button type="submit">Create</button>
</form>"#,
            supported = html_escape(&scopes_supported.to_string()),
        ),
    )
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientMetadata, GrantType, TokenEndpointAuthMethod, UserId};

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<script>alert("xss")</script>"#),
            "&lt;script&gt;alert(&quot;xss&quot;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_home_without_user_shows_login() {
        let html = render_home(None, &[], Some("bad <name>"));
        assert!(html.contains(r#"name="username""#));
        assert!(html.contains("bad &lt;name&gt;"));
    }

    #[test]
    fn test_home_lists_clients() {
        let user = User { id: UserId::new(), username: "alice".into() };
        let metadata = ClientMetadata::new("<Demo>", TokenEndpointAuthMethod::ClientSecretBasic)
            .redirect_uri("https://app/cb")
            .grant_type(GrantType::AuthorizationCode);
        let client = Client::register(metadata, Some(user.id)).unwrap();

        let html = render_home(Some(&user), std::slice::from_ref(&client), None);
        assert!(html.contains("Signed in as alice"));
        assert!(html.contains(&client.client_id));
        assert!(html.contains("&lt;Demo&gt;"));
        assert!(!html.contains("<Demo>"));
    }

    #[test]
    fn test_create_client_form_lists_scopes() {
        let html = render_create_client(&Scope::parse("openid profile"), None);
        assert!(html.contains("openid profile"));
        assert!(!html.contains(r#"class="error""#));
    }
}
