use crate::config::SpotifySettings;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;
use url::Url;

/// Scopes playlist write-back needs.
pub const WRITE_SCOPES: [&str; 3] = [
    "playlist-modify-private",
    "playlist-modify-public",
    "playlist-read-private",
];

#[derive(Deserialize)]
struct TokenResponse {
    #[allow(dead_code)]
    access_token: String,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn prompt(message: &str) -> Result<String> {
    println!("{}", message);
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Builds the URL the operator opens to approve write access.
pub fn authorize_url(auth_base: &str, client_id: &str, redirect_uri: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/authorize", auth_base.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("scope", &WRITE_SCOPES.join(" "))
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("show_dialog", "true");
    Ok(url)
}

/// Pulls the `code` parameter out of the pasted redirect URL.
pub fn code_from_redirect(redirect: &str) -> Result<String> {
    let parsed = Url::parse(redirect.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow!("no code in redirect URL"))
}

/// Manual authorization-code flow. Prints the authorization URL, reads back
/// the redirect URL, exchanges the code and prints the refresh token to put
/// under `[spotify] refresh_token`.
pub async fn run_spotify_auth(settings: &SpotifySettings) -> Result<()> {
    let client_id = if settings.client_id.is_empty() {
        prompt("Enter your Spotify client_id:")?
    } else {
        settings.client_id.clone()
    };
    let client_secret = if settings.client_secret.is_empty() {
        prompt("Enter your Spotify client_secret:")?
    } else {
        settings.client_secret.clone()
    };
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(anyhow!("client_id and client_secret are required"));
    }

    let redirect_uri = match prompt("Enter your Spotify redirect URI (leave blank for http://127.0.0.1:8888/):")? {
        r if r.is_empty() => "http://127.0.0.1:8888/".to_string(),
        r => r,
    };

    let url = authorize_url(&settings.auth_base, &client_id, &redirect_uri)?;
    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    let code = code_from_redirect(&prompt("Paste redirect URL:")?)?;

    let params = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
    ];
    let auth_header = format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret))
    );
    let resp = Client::new()
        .post(format!("{}/api/token", settings.auth_base.trim_end_matches('/')))
        .header("Authorization", auth_header)
        .form(&params)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }

    let tr: TokenResponse = resp.json().await?;
    let refresh = tr
        .refresh_token
        .ok_or_else(|| anyhow!("token response carried no refresh_token"))?;
    info!("Spotify authorization granted (scope: {})", tr.scope.unwrap_or_default());
    println!("Add this to the [spotify] section of your config:\n\nrefresh_token = \"{}\"", refresh);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_write_scopes() {
        let url = authorize_url("https://accounts.example/", "cid", "http://127.0.0.1:8888/").unwrap();
        assert!(url.as_str().starts_with("https://accounts.example/authorize?"));
        let scope = url.query_pairs().find(|(k, _)| k == "scope").unwrap().1.into_owned();
        assert!(scope.contains("playlist-modify-private"));
    }

    #[test]
    fn code_is_read_from_redirect() {
        assert_eq!(code_from_redirect("http://127.0.0.1:8888/?code=abc&state=x").unwrap(), "abc");
        assert!(code_from_redirect("http://127.0.0.1:8888/?error=denied").is_err());
    }
}
