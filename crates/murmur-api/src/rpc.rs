//! Positional RPC surface: `POST /rpc` with `{"method": .., "params": [..]}`.
//!
//! Domain errors travel as `200` with `{"ok": false, ...}` bodies so every
//! client sees one envelope. Malformed envelopes and unknown methods are
//! transport errors and get a 4xx status instead.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info_span, warn};

use murmur_types::api::{ErrorBody, ErrorKind, RpcRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::{auth, conversations, events, messages, users};

/// Transport-level failure, reported outside the domain error envelope.
#[derive(Debug)]
pub struct RpcFault {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl RpcFault {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_REQUEST",
            message: message.into(),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_PARAMS",
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "METHOD_NOT_FOUND",
            message: format!("unknown method '{}'", method),
        }
    }
}

impl IntoResponse for RpcFault {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.code, ErrorKind::InvalidInput, self.message);
        (self.status, Json(body)).into_response()
    }
}

/// Positional arguments with arity checking.
struct Params {
    method: String,
    values: Vec<Value>,
}

impl Params {
    fn arity(&self, min: usize, max: usize) -> Result<(), RpcFault> {
        let n = self.values.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(RpcFault::invalid_params(format!(
                "{} expects {} params, got {}",
                self.method, expected, n
            )));
        }
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, idx: usize, name: &str) -> Result<T, RpcFault> {
        let value = self.values.get(idx).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| RpcFault::invalid_params(format!("param {} ({}): {}", idx, name, e)))
    }

    /// Missing and `null` both read as `None`.
    fn opt<T: DeserializeOwned>(&self, idx: usize, name: &str) -> Result<Option<T>, RpcFault> {
        match self.values.get(idx) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(idx, name).map(Some),
        }
    }
}

pub async fn handle_rpc(
    State(state): State<AppState>,
    payload: Result<Json<RpcRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("rejected rpc envelope: {}", rejection.body_text());
            return RpcFault::invalid_request(rejection.body_text()).into_response();
        }
    };

    let span = info_span!("rpc", method = %request.method);
    async move {
        let params = Params {
            method: request.method,
            values: request.params,
        };
        match dispatch(&state, &params).await {
            Ok(Ok(value)) => success(value),
            Ok(Err(err)) => failure(&params.method, err),
            Err(fault) => fault.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn dispatch(state: &AppState, p: &Params) -> Result<ApiResult<Value>, RpcFault> {
    let result = match p.method.as_str() {
        "register_user" => {
            p.arity(3, 3)?;
            to_value(auth::register(state, p.get(0, "email")?, p.get(1, "name")?, p.get(2, "password")?).await)
        }
        "login" => {
            p.arity(2, 2)?;
            to_value(auth::login(state, p.get(0, "email")?, p.get(1, "password")?).await)
        }
        "logout" => {
            p.arity(1, 1)?;
            auth::logout(state, p.get(0, "token")?).await.map(|()| json!({}))
        }
        "list_users" => {
            p.arity(1, 1)?;
            to_value(users::list_users(state, p.get(0, "token")?).await)
        }
        "create_group" => {
            p.arity(3, 3)?;
            to_value(
                conversations::create_group(
                    state,
                    p.get(0, "token")?,
                    p.opt(1, "title")?,
                    p.get(2, "member_ids")?,
                )
                .await,
            )
        }
        "ensure_pair_group" => {
            p.arity(2, 2)?;
            to_value(conversations::ensure_pair_group(state, p.get(0, "token")?, p.get(1, "other_user_id")?).await)
        }
        "send_group_message" => {
            p.arity(3, 3)?;
            to_value(
                messages::send_message(
                    state,
                    p.get(0, "token")?,
                    p.get(1, "conversation_id")?,
                    p.get(2, "content")?,
                )
                .await,
            )
        }
        "list_my_conversations" => {
            p.arity(1, 1)?;
            to_value(conversations::list_conversations(state, p.get(0, "token")?).await)
        }
        "get_messages" => {
            p.arity(2, 4)?;
            to_value(
                messages::get_messages(
                    state,
                    p.get(0, "token")?,
                    p.get(1, "conversation_id")?,
                    p.opt(2, "limit")?,
                    p.opt(3, "offset")?,
                )
                .await,
            )
        }
        "get_messages_since" => {
            p.arity(3, 3)?;
            to_value(
                messages::get_messages_since(
                    state,
                    p.get(0, "token")?,
                    p.get(1, "conversation_id")?,
                    p.get(2, "last_message_id")?,
                )
                .await,
            )
        }
        "leave_group" => {
            p.arity(2, 2)?;
            to_value(conversations::leave_group(state, p.get(0, "token")?, p.get(1, "conversation_id")?).await)
        }
        "wait_events" => {
            p.arity(2, 3)?;
            let timeout_ms = p.opt(2, "timeout_ms")?.unwrap_or(state.max_wait.as_millis() as i64);
            to_value(events::wait_events(state, p.get(0, "token")?, p.get(1, "since_id")?, timeout_ms).await)
        }
        other => return Err(RpcFault::method_not_found(other)),
    };
    Ok(result)
}

fn to_value<T: Serialize>(result: ApiResult<T>) -> ApiResult<Value> {
    result.and_then(|v| serde_json::to_value(v).map_err(|e| ApiError::Internal(e.into())))
}

fn success(value: Value) -> Response {
    let body = match value {
        Value::Object(mut map) => {
            map.insert("ok".into(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({ "ok": true, "result": other }),
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn failure(method: &str, err: ApiError) -> Response {
    let status = match &err {
        ApiError::Internal(e) => {
            error!(method, "rpc failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        other => {
            debug!(method, code = other.code(), "rpc rejected: {}", other);
            StatusCode::OK
        }
    };
    (status, Json(err.to_body())).into_response()
}
