use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;

use mailconf::admin::DkimAddParams;
use mailconf::dynamic::schema::AliasSettings;
use mailconf::http::handlers::{
    AddAccountRequest, AddAddressRequest, AddAliasRequest, AddDkimRequest, AddDomainRequest, AliasMembersRequest,
};

#[derive(Parser)]
#[command(name = "mailconf-cli")]
#[command(about = "Management CLI for the mail server's dynamic configuration", long_about = None)]
struct Cli {
    #[arg(short, long, env = "MAILCONF_URL", default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "MAILCONF_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Print the current dynamic configuration
    Config,
    /// Manage domains
    #[command(subcommand)]
    Domain(DomainCommand),
    /// Manage DKIM selectors
    #[command(subcommand)]
    Dkim(DkimCommand),
    /// Manage accounts
    #[command(subcommand)]
    Account(AccountCommand),
    /// Manage account addresses
    #[command(subcommand)]
    Address(AddressCommand),
    /// Manage aliases
    #[command(subcommand)]
    Alias(AliasCommand),
}

#[derive(Subcommand)]
enum DomainCommand {
    List,
    /// Add a domain, creating the account if a localpart is given
    Add {
        domain: String,
        account: String,
        localpart: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    Remove { domain: String },
}

#[derive(Subcommand)]
enum DkimCommand {
    /// Add a selector with a newly generated key
    Add {
        domain: String,
        selector: String,
        #[command(flatten)]
        params: DkimArgs,
    },
    Remove { domain: String, selector: String },
}

#[derive(Args)]
struct DkimArgs {
    /// rsa or ed25519
    #[arg(long, default_value = "ed25519")]
    algorithm: String,
    #[arg(long, default_value = "sha256")]
    hash: String,
    /// Use simple instead of relaxed header canonicalization
    #[arg(long)]
    header_simple: bool,
    /// Use simple instead of relaxed body canonicalization
    #[arg(long)]
    body_simple: bool,
    /// Do not oversign headers
    #[arg(long)]
    no_seal: bool,
    /// Header to sign, repeatable
    #[arg(long = "header")]
    headers: Vec<String>,
    /// Signature lifetime in seconds
    #[arg(long, default_value_t = 72 * 3600)]
    lifetime: u64,
}

#[derive(Subcommand)]
enum AccountCommand {
    List,
    /// Show an account's configuration and alias memberships
    Show { account: String },
    Add { account: String, address: String },
    Remove { account: String },
}

#[derive(Subcommand)]
enum AddressCommand {
    /// Add an address, or @domain for a catchall
    Add { address: String, account: String },
    Remove { address: String },
}

#[derive(Subcommand)]
enum AliasCommand {
    Show { address: String },
    Add {
        address: String,
        #[arg(required = true)]
        members: Vec<String>,
        #[command(flatten)]
        settings: AliasArgs,
    },
    /// Replace the alias flags, keeping its members
    Update {
        address: String,
        #[command(flatten)]
        settings: AliasArgs,
    },
    Remove { address: String },
    /// Add members to an alias
    AddMembers {
        address: String,
        #[arg(required = true)]
        members: Vec<String>,
    },
    /// Remove members from an alias
    RemoveMembers {
        address: String,
        #[arg(required = true)]
        members: Vec<String>,
    },
}

#[derive(Args)]
struct AliasArgs {
    #[arg(long)]
    post_public: bool,
    #[arg(long)]
    list_members: bool,
    #[arg(long)]
    allow_msg_from: bool,
}

impl From<AliasArgs> for AliasSettings {
    fn from(a: AliasArgs) -> Self {
        Self {
            post_public: a.post_public,
            list_members: a.list_members,
            allow_msg_from: a.allow_msg_from,
        }
    }
}

struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    fn new(url: &str, key: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            base: url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}/admin/{}", self.base, path))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new(&cli.url, &cli.key)?;

    let req = match cli.command {
        Commands::Status => client.request(Method::GET, "status"),
        Commands::Config => client.request(Method::GET, "config"),

        Commands::Domain(DomainCommand::List) => client.request(Method::GET, "domains"),
        Commands::Domain(DomainCommand::Add {
            domain,
            account,
            localpart,
            disabled,
        }) => client.request(Method::POST, "domains").json(&AddDomainRequest {
            domain,
            account,
            localpart,
            disabled,
        }),
        Commands::Domain(DomainCommand::Remove { domain }) => {
            client.request(Method::DELETE, &format!("domains/{domain}"))
        }

        Commands::Dkim(DkimCommand::Add {
            domain,
            selector,
            params,
        }) => client
            .request(Method::POST, &format!("domains/{domain}/dkim"))
            .json(&AddDkimRequest {
                selector,
                params: DkimAddParams {
                    algorithm: params.algorithm,
                    hash: params.hash,
                    header_relaxed: !params.header_simple,
                    body_relaxed: !params.body_simple,
                    seal_headers: !params.no_seal,
                    headers: params.headers,
                    lifetime_secs: params.lifetime,
                },
            }),
        Commands::Dkim(DkimCommand::Remove { domain, selector }) => {
            client.request(Method::DELETE, &format!("domains/{domain}/dkim/{selector}"))
        }

        Commands::Account(AccountCommand::List) => client.request(Method::GET, "accounts"),
        Commands::Account(AccountCommand::Show { account }) => {
            client.request(Method::GET, &format!("accounts/{account}"))
        }
        Commands::Account(AccountCommand::Add { account, address }) => client
            .request(Method::POST, "accounts")
            .json(&AddAccountRequest { account, address }),
        Commands::Account(AccountCommand::Remove { account }) => {
            client.request(Method::DELETE, &format!("accounts/{account}"))
        }

        Commands::Address(AddressCommand::Add { address, account }) => client
            .request(Method::POST, "addresses")
            .json(&AddAddressRequest { address, account }),
        Commands::Address(AddressCommand::Remove { address }) => {
            client.request(Method::DELETE, &format!("addresses/{address}"))
        }

        Commands::Alias(AliasCommand::Show { address }) => client.request(Method::GET, &format!("aliases/{address}")),
        Commands::Alias(AliasCommand::Add {
            address,
            members,
            settings,
        }) => client.request(Method::POST, "aliases").json(&AddAliasRequest {
            address,
            addresses: members,
            settings: settings.into(),
        }),
        Commands::Alias(AliasCommand::Update { address, settings }) => client
            .request(Method::PUT, &format!("aliases/{address}"))
            .json(&AliasSettings::from(settings)),
        Commands::Alias(AliasCommand::Remove { address }) => {
            client.request(Method::DELETE, &format!("aliases/{address}"))
        }
        Commands::Alias(AliasCommand::AddMembers { address, members }) => client
            .request(Method::POST, &format!("aliases/{address}/members"))
            .json(&AliasMembersRequest { addresses: members }),
        Commands::Alias(AliasCommand::RemoveMembers { address, members }) => client
            .request(Method::DELETE, &format!("aliases/{address}/members"))
            .json(&AliasMembersRequest { addresses: members }),
    };

    let ok = print_response(req.send().await?).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Prints the response body, returning whether the request succeeded.
async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {status}");
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => match json.get("error").and_then(Value::as_str) {
                Some(msg) => eprintln!("{msg}"),
                None => eprintln!("{json}"),
            },
            Err(_) if !text.is_empty() => eprintln!("Response: {text}"),
            Err(_) => {}
        }
        return Ok(false);
    }

    if text.is_empty() {
        println!("ok");
    } else {
        let json: Value = serde_json::from_str(&text)?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(true)
}
