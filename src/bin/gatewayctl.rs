use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::RequestBuilder;
use serde_json::Value;
use url::Url;

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the identity gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "IDGW_ADMIN_URL", default_value = "http://localhost:8081")]
    url: Url,

    #[arg(short, long, env = "IDGW_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status and snapshot version
    Status,
    /// Print the current route and cluster snapshot
    Config,
    /// Reload route configuration from the store
    Reload,
    /// Wait for the next configuration change
    Watch {
        /// Version already seen; returns at once if the current one differs
        #[arg(long)]
        since: Option<u64>,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Check whether a cache key is present
    CacheExists { key: String },
    /// Remove one cache key
    Evict { key: String },
    /// Remove every cache key starting with a prefix
    EvictPrefix { prefix: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = &cli.url;

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(endpoint(base, &["admin", "status"])?),
        Commands::Config => client.get(endpoint(base, &["admin", "config"])?),
        Commands::Reload => client.post(endpoint(base, &["admin", "config", "reload"])?),
        Commands::Watch {
            since,
            timeout_secs,
        } => {
            let mut query = vec![("timeout_secs", timeout_secs.to_string())];
            if let Some(since) = since {
                query.push(("since", since.to_string()));
            }
            client
                .get(endpoint(base, &["admin", "config", "watch"])?)
                .query(&query)
        }
        Commands::CacheExists { key } => client.get(endpoint(base, &["admin", "cache", key])?),
        Commands::Evict { key } => client.delete(endpoint(base, &["admin", "cache", key])?),
        Commands::EvictPrefix { prefix } => client
            .delete(endpoint(base, &["admin", "cache"])?)
            .query(&[("prefix", prefix)]),
    };

    send(request.headers(headers)).await
}

/// Append path segments to the admin base URL. Each segment is
/// percent-encoded, so cache keys containing `/` stay one segment.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, Box<dyn std::error::Error>> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn send(request: RequestBuilder) -> Result<(), Box<dyn std::error::Error>> {
    let res = request.send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_segments() {
        let base = Url::parse("http://localhost:8081/").unwrap();
        let url = endpoint(&base, &["admin", "config", "reload"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8081/admin/config/reload");
    }

    #[test]
    fn test_endpoint_encodes_cache_keys() {
        let base = Url::parse("http://gw.internal:8081").unwrap();
        let url = endpoint(&base, &["admin", "cache", "idgw:user:name:a b/c"]).unwrap();
        assert_eq!(
            url.path(),
            "/admin/cache/idgw:user:name:a%20b%2Fc"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("http://proxy/gateway").unwrap();
        let url = endpoint(&base, &["admin", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://proxy/gateway/admin/status");
    }
}
