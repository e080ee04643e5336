// src/transport.rs
//
// HTTP-слой поверх ContactService: маршруты, декодирование,
// валидация запросов и JSON-конверт {"data": ...} / {"error": ...}.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::contact::{is_digits_only, Contact, Filters};
use crate::db::monitoring::gather_metrics;
use crate::error::{ContactError, ErrorKind};
use crate::service::ContactService;

const CONTACTS_URL: &str = "/users/:user_id/contacts";
const CONTACT_URL: &str = "/users/:user_id/contacts/:contact_id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ContactService>,
    pub max_page_size: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CONTACTS_URL, post(create_contact).get(search_contacts))
        .route(
            CONTACT_URL,
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ---------------------- Ответы ----------------------

#[derive(Debug, Serialize)]
struct DataResponse<T> {
    data: T,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(DataResponse { data })).into_response()
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Ошибка, отдаваемая клиенту. Код статуса определяется видом ошибки.
#[derive(Debug)]
pub struct ApiError(ContactError);

impl From<ContactError> for ApiError {
    fn from(err: ContactError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0.kind {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{} error: {}", self.0.kind, self.0);
        }
        let body = Json(ErrorBody { error: self.0.message });
        (status, body).into_response()
    }
}

type ApiResult<T = Response> = Result<T, ApiError>;

fn invalid_request(messages: Vec<String>) -> Result<(), ContactError> {
    if messages.is_empty() {
        return Ok(());
    }
    Err(ContactError::bad_request(format!(
        "invalid request: {}",
        messages.join(", ")
    )))
}

fn decode_json<T>(body: Result<Json<T>, JsonRejection>, context: &str) -> Result<T, ContactError> {
    body.map(|Json(v)| v)
        .map_err(|e| ContactError::bad_request(format!("{context}: {}", e.body_text())))
}

/// Общие проверки полей контакта для create/update.
fn validate_contact_fields(
    messages: &mut Vec<String>,
    user_id: &str,
    phone: &str,
    first_name: &str,
    last_name: &str,
    address: &str,
) {
    if user_id.is_empty() {
        messages.push("userID is required".to_string());
    }
    if phone.is_empty() || !is_digits_only(phone) {
        messages.push("phone is required and must be digits only".to_string());
    }
    if first_name.is_empty() {
        messages.push("firstName is required".to_string());
    }
    if last_name.is_empty() {
        messages.push("lastName is required".to_string());
    }
    if address.is_empty() {
        messages.push("address is required".to_string());
    }
}

// ---------------------- Create ----------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateContactRequest {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateContactResponse {
    pub id: String,
}

async fn create_contact(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<CreateContactRequest>, JsonRejection>,
) -> ApiResult {
    let req = decode_json(body, "decode_create_contact_request")?;

    let mut messages = Vec::new();
    validate_contact_fields(
        &mut messages,
        &user_id,
        &req.phone,
        &req.first_name,
        &req.last_name,
        &req.address,
    );
    invalid_request(messages).map_err(|e| e.wrap("endpoint_create_contact"))?;

    let contact = Contact {
        user_id,
        phone: req.phone,
        first_name: req.first_name,
        last_name: req.last_name,
        address: req.address,
        ..Contact::default()
    };

    let id = state
        .service
        .create_contact(contact)
        .await
        .map_err(|e| e.wrap("endpoint_create_contact"))?;

    Ok(success(CreateContactResponse { id }))
}

// ---------------------- Update ----------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateContactRequest {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    /// Версия, прочитанная клиентом
    pub updated_at: Option<DateTime<Utc>>,
}

async fn update_contact(
    State(state): State<AppState>,
    Path((user_id, contact_id)): Path<(String, String)>,
    body: Result<Json<UpdateContactRequest>, JsonRejection>,
) -> ApiResult {
    let req = decode_json(body, "decode_update_contact_request")?;

    let mut messages = Vec::new();
    if contact_id.is_empty() {
        messages.push("contactID is required".to_string());
    }
    validate_contact_fields(
        &mut messages,
        &user_id,
        &req.phone,
        &req.first_name,
        &req.last_name,
        &req.address,
    );
    if req.updated_at.is_none() {
        messages.push("updatedAt is required".to_string());
    }
    invalid_request(messages).map_err(|e| e.wrap("endpoint_update_contact"))?;

    let contact = Contact {
        user_id,
        id: contact_id,
        phone: req.phone,
        first_name: req.first_name,
        last_name: req.last_name,
        address: req.address,
        updated_at: req.updated_at.unwrap_or_default(),
        ..Contact::default()
    };

    let updated = state
        .service
        .update_contact(contact)
        .await
        .map_err(|e| e.wrap("endpoint_update_contact"))?;

    Ok(success(ContactResponse::from(updated)))
}

// ---------------------- Get ----------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub id: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Contact> for ContactResponse {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            phone: c.phone,
            first_name: c.first_name,
            last_name: c.last_name,
            address: c.address,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

fn validate_identity(user_id: &str, contact_id: &str) -> Result<(), ContactError> {
    let mut messages = Vec::new();
    if user_id.is_empty() {
        messages.push("userID is required".to_string());
    }
    if contact_id.is_empty() {
        messages.push("contactID is required".to_string());
    }
    invalid_request(messages)
}

async fn get_contact(
    State(state): State<AppState>,
    Path((user_id, contact_id)): Path<(String, String)>,
) -> ApiResult {
    validate_identity(&user_id, &contact_id).map_err(|e| e.wrap("endpoint_get_contact"))?;

    let contact = state
        .service
        .get_contact(&user_id, &contact_id)
        .await
        .map_err(|e| e.wrap("endpoint_get_contact"))?;

    Ok(success(ContactResponse::from(contact)))
}

// ---------------------- Search ----------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchContactsParams {
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchContactsResponse {
    pub contacts: Vec<ContactResponse>,
    pub pagination: Pagination,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

/// Проверяет параметры поиска и собирает фильтры. Лимит 0 или его
/// отсутствие означает максимальный размер страницы.
fn search_filters(
    user_id: String,
    params: SearchContactsParams,
    max_page_size: usize,
) -> Result<Filters, ContactError> {
    let mut messages = Vec::new();

    if user_id.is_empty() {
        messages.push("userID is required".to_string());
    }

    let phone = non_empty(params.phone);
    if let Some(p) = &phone {
        if !is_digits_only(p) {
            messages.push("phone must be digits only".to_string());
        }
    }

    let mut limit = 0usize;
    if let Some(raw) = non_empty(params.limit) {
        match raw.parse::<usize>() {
            Ok(v) if v <= max_page_size => limit = v,
            _ => messages.push(format!(
                "limit must be a positive number smaller than or equal to {max_page_size}"
            )),
        }
    }

    let mut offset = 0usize;
    if let Some(raw) = non_empty(params.offset) {
        match raw.parse::<usize>() {
            Ok(v) => offset = v,
            Err(_) => messages.push("offset must be greater than or equal to 0".to_string()),
        }
    }

    invalid_request(messages)?;

    Ok(Filters {
        user_id,
        phone,
        first_name: non_empty(params.first_name),
        last_name: non_empty(params.last_name),
        address: non_empty(params.address),
        limit: Some(if limit == 0 { max_page_size } else { limit }),
        offset,
    })
}

fn search_url(filters: &Filters, offset: usize) -> String {
    let enc = |v: &Option<String>| urlencoding::encode(v.as_deref().unwrap_or("")).into_owned();
    format!(
        "/users/{}/contacts?phone={}&firstName={}&lastName={}&address={}&limit={}&offset={}",
        urlencoding::encode(&filters.user_id),
        enc(&filters.phone),
        enc(&filters.first_name),
        enc(&filters.last_name),
        enc(&filters.address),
        filters.limit.unwrap_or_default(),
        offset,
    )
}

fn pagination(filters: &Filters, page_len: usize) -> Pagination {
    let limit = filters.limit.unwrap_or_default();
    Pagination {
        previous: (filters.offset > 0)
            .then(|| search_url(filters, filters.offset.saturating_sub(limit))),
        next: (page_len > 0).then(|| search_url(filters, filters.offset + limit)),
    }
}

async fn search_contacts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<SearchContactsParams>,
) -> ApiResult {
    let filters = search_filters(user_id, params, state.max_page_size)
        .map_err(|e| e.wrap("endpoint_search_contacts"))?;

    let contacts = state
        .service
        .search_contacts(&filters)
        .await
        .map_err(|e| e.wrap("endpoint_search_contacts"))?;

    let pagination = pagination(&filters, contacts.len());
    Ok(success(SearchContactsResponse {
        contacts: contacts.into_iter().map(ContactResponse::from).collect(),
        pagination,
    }))
}

// ---------------------- Delete ----------------------

async fn delete_contact(
    State(state): State<AppState>,
    Path((user_id, contact_id)): Path<(String, String)>,
) -> ApiResult {
    validate_identity(&user_id, &contact_id).map_err(|e| e.wrap("endpoint_delete_contact"))?;

    state
        .service
        .delete_contact(&user_id, &contact_id)
        .await
        .map_err(|e| e.wrap("endpoint_delete_contact"))?;

    Ok(success(serde_json::json!({})))
}

// ---------------------- Metrics ----------------------

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Запускает HTTP-сервер и блокируется до его остановки.
pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
