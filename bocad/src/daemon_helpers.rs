fn token_source<F>(lookup: &F) -> anyhow::Result<TokenSource>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup("BOCA_TOKEN").filter(|value| !value.trim().is_empty()) {
        return Ok(TokenSource::Bearer(token));
    }
    match (lookup("BOCA_USERNAME"), lookup("BOCA_CREDENTIAL")) {
        (Some(name), Some(credential)) => Ok(TokenSource::Credentials { name, credential }),
        _ => anyhow::bail!("set BOCA_TOKEN, or BOCA_USERNAME and BOCA_CREDENTIAL"),
    }
}

async fn resolve_token(config: &DaemonConfig) -> anyhow::Result<String> {
    match &config.token {
        TokenSource::Bearer(token) => Ok(token.clone()),
        TokenSource::Credentials { name, credential } => {
            let client = TokenClient::new(&config.api_uri).context("invalid BOCA_API_URI")?;
            let token = client
                .request_token(name, credential)
                .await
                .context("failed to obtain access token")?;
            info!(user = %name, "access token obtained");
            Ok(token)
        }
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u32<F>(lookup: &F, name: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

async fn badge_for(decorations: &DecorationEngine, path: &Path) -> &'static str {
    decorations
        .get(path)
        .await
        .map(|decoration| decoration.badge.symbol())
        .unwrap_or(" ")
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}
