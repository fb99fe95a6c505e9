//! Admin API handlers.
//!
//! Every mutating handler parses its arguments, then runs the admin
//! operation on the blocking thread pool: operations take the store's
//! mutation lock and may generate keys.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::address::{Address, DestinationAddress, Domain, Localpart};
use crate::admin::{Admin, AdminError, DkimAddParams};
use crate::dynamic::schema::{AccountConfig, Alias, AliasSettings, ConfigSnapshot};
use crate::http::server::ApiState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = if self.is_request() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorBody { error: self.to_string() };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub domains: usize,
    pub accounts: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountDetails {
    pub config: AccountConfig,
    pub aliases: Vec<AliasMembershipView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AliasMembershipView {
    pub alias: String,
    /// Member address through which the account receives the alias's mail.
    pub subscription_address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddDomainRequest {
    pub domain: String,
    pub account: String,
    /// Required when `account` does not exist yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localpart: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddDkimRequest {
    pub selector: String,
    #[serde(flatten)]
    pub params: DkimAddParams,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddAccountRequest {
    pub account: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddAddressRequest {
    /// Plain address, or `@domain` for a catchall.
    pub address: String,
    pub account: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddAliasRequest {
    pub address: String,
    pub addresses: Vec<String>,
    #[serde(flatten)]
    pub settings: AliasSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AliasMembersRequest {
    pub addresses: Vec<String>,
}

/// Runs `f` on the blocking thread pool.
async fn blocking<T, F>(state: &ApiState, f: F) -> Result<T, AdminError>
where
    F: FnOnce(&Admin) -> Result<T, AdminError> + Send + 'static,
    T: Send + 'static,
{
    let admin = state.admin.clone();
    tokio::task::spawn_blocking(move || f(&admin))
        .await
        .map_err(|e| AdminError::internal("running admin operation", e))?
}

pub async fn get_status(State(state): State<ApiState>) -> Json<SystemStatus> {
    let snapshot = state.admin.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        domains: snapshot.domains.len(),
        accounts: snapshot.accounts.len(),
    })
}

pub async fn get_config(State(state): State<ApiState>) -> Json<ConfigSnapshot> {
    Json(ConfigSnapshot::clone(&state.admin.snapshot()))
}

pub async fn list_domains(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.admin.snapshot().domains.keys().cloned().collect())
}

pub async fn add_domain(
    State(state): State<ApiState>,
    Json(req): Json<AddDomainRequest>,
) -> Result<StatusCode, AdminError> {
    let domain = Domain::parse(&req.domain)?;
    let localpart = req.localpart.as_deref().map(Localpart::parse).transpose()?;
    blocking(&state, move |admin| {
        admin.domain_add(req.disabled, &domain, &req.account, localpart.as_ref())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_domain(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> Result<StatusCode, AdminError> {
    let domain = Domain::parse(&domain)?;
    blocking(&state, move |admin| admin.domain_remove(&domain)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_dkim(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
    Json(req): Json<AddDkimRequest>,
) -> Result<StatusCode, AdminError> {
    let domain = Domain::parse(&domain)?;
    let selector = Domain::parse(&req.selector)?;
    blocking(&state, move |admin| admin.dkim_add(&domain, &selector, &req.params)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_dkim(
    State(state): State<ApiState>,
    Path((domain, selector)): Path<(String, String)>,
) -> Result<StatusCode, AdminError> {
    let domain = Domain::parse(&domain)?;
    let selector = Domain::parse(&selector)?;
    blocking(&state, move |admin| admin.dkim_remove(&domain, &selector)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_accounts(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.admin.snapshot().accounts.keys().cloned().collect())
}

pub async fn get_account(
    State(state): State<ApiState>,
    Path(account): Path<String>,
) -> Result<Json<AccountDetails>, AdminError> {
    let (config, memberships) = state.admin.account_get(&account)?;
    Ok(Json(AccountDetails {
        config,
        aliases: memberships
            .into_iter()
            .map(|m| AliasMembershipView {
                alias: m.alias.to_string(),
                subscription_address: m.subscription_address,
            })
            .collect(),
    }))
}

pub async fn add_account(
    State(state): State<ApiState>,
    Json(req): Json<AddAccountRequest>,
) -> Result<StatusCode, AdminError> {
    let address = Address::parse(&req.address)?;
    blocking(&state, move |admin| admin.account_add(&req.account, &address)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_account(
    State(state): State<ApiState>,
    Path(account): Path<String>,
) -> Result<StatusCode, AdminError> {
    blocking(&state, move |admin| admin.account_remove(&account)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_address(
    State(state): State<ApiState>,
    Json(req): Json<AddAddressRequest>,
) -> Result<StatusCode, AdminError> {
    let dest = DestinationAddress::parse(&req.address)?;
    blocking(&state, move |admin| admin.address_add(&dest, &req.account)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<StatusCode, AdminError> {
    let dest = DestinationAddress::parse(&address)?;
    blocking(&state, move |admin| admin.address_remove(&dest)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_alias(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<Alias>, AdminError> {
    let address = Address::parse(&address)?;
    Ok(Json(state.admin.alias_get(&address)?))
}

pub async fn add_alias(
    State(state): State<ApiState>,
    Json(req): Json<AddAliasRequest>,
) -> Result<StatusCode, AdminError> {
    let address = Address::parse(&req.address)?;
    let alias = Alias {
        addresses: req.addresses,
        post_public: req.settings.post_public,
        list_members: req.settings.list_members,
        allow_msg_from: req.settings.allow_msg_from,
    };
    blocking(&state, move |admin| admin.alias_add(&address, alias)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_alias(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(settings): Json<AliasSettings>,
) -> Result<StatusCode, AdminError> {
    let address = Address::parse(&address)?;
    blocking(&state, move |admin| admin.alias_update(&address, settings)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_alias(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<StatusCode, AdminError> {
    let address = Address::parse(&address)?;
    blocking(&state, move |admin| admin.alias_remove(&address)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_alias_members(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<AliasMembersRequest>,
) -> Result<StatusCode, AdminError> {
    let address = Address::parse(&address)?;
    blocking(&state, move |admin| admin.alias_addresses_add(&address, &req.addresses)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_alias_members(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<AliasMembersRequest>,
) -> Result<StatusCode, AdminError> {
    let address = Address::parse(&address)?;
    blocking(&state, move |admin| admin.alias_addresses_remove(&address, &req.addresses)).await?;
    Ok(StatusCode::NO_CONTENT)
}
