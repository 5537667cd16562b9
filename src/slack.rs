use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Notify, RwLock, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::bot::{ACKNOWLEDGMENT_REACTION, ChatEvent, ChatTransport, WorkspaceMember};
use crate::config::Config;
use crate::utils::AppError;

pub mod command_handler;
pub mod events;

pub use self::command_handler::{CommandReply, SlashCommandForm, SlashCommandHandler};
use self::events::{OwnIdentity, SocketFrame, envelope_id, parse_member, parse_socket_payload};

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const USERS_LIST_PAGE_SIZE: u32 = 200;
const MAX_USERS_LIST_PAGES: usize = 100;

/// Error codes after which reconnecting cannot succeed.
const FATAL_AUTH_ERRORS: [&str; 3] = ["invalid_auth", "not_authed", "account_inactive"];

#[derive(Debug, Error)]
#[error("Slack API {method} returned ok=false: {code}")]
pub struct SlackApiError {
    pub method: String,
    pub code: String,
}

impl SlackApiError {
    pub fn is_fatal_auth(&self) -> bool {
        FATAL_AUTH_ERRORS.contains(&self.code.as_str())
    }
}

fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SlackApiError>()
        .is_some_and(SlackApiError::is_fatal_auth)
}

enum SocketControl {
    Continue,
    Reconnect,
}

type SocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Slack Socket Mode and Web API client. Incoming events are forwarded to
/// the bot over `events`.
#[derive(Clone)]
pub struct SlackClient {
    config: Arc<Config>,
    events: mpsc::Sender<ChatEvent>,
    send_lock: Arc<tokio::sync::Mutex<()>>,
    login_state: Arc<tokio::sync::Mutex<SlackLoginState>>,
    http: reqwest::Client,
    identity: Arc<RwLock<OwnIdentity>>,
    finished: Arc<Notify>,
}

#[derive(Default)]
struct SlackLoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

impl SlackClient {
    pub fn new(config: Arc<Config>, events: mpsc::Sender<ChatEvent>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("slack-standup-bot")
            .build()
            .context("failed to construct HTTP client")?;

        Ok(Self {
            config,
            events,
            send_lock: Arc::new(tokio::sync::Mutex::new(())),
            login_state: Arc::new(tokio::sync::Mutex::new(SlackLoginState::default())),
            http,
            identity: Arc::new(RwLock::new(OwnIdentity::default())),
            finished: Arc::new(Notify::new()),
        })
    }

    pub async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        let identity = self.auth_test().await?;
        let user_id = identity.user_id.clone().unwrap_or_default();
        *self.identity.write().await = identity;

        let client = self.clone();
        let finished = self.finished.clone();
        let gateway_task = tokio::spawn(async move {
            client.socket_mode_loop().await;
            finished.notify_one();
        });

        state.gateway_task = Some(gateway_task);
        state.is_logged_in = true;
        info!("slack socket mode started user={}", user_id);

        Ok(())
    }

    /// Logs in, retrying with back-off until it works or the token is rejected.
    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;
        loop {
            match self.login().await {
                Ok(()) => {
                    info!("slack client is ready");
                    return Ok(());
                }
                Err(err) if is_fatal(&err) => {
                    error!("slack rejected the bot token, giving up: {err}");
                    return Err(err);
                }
                Err(err) => {
                    error!(
                        "failed to start slack client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(Duration::from_secs(retry_seconds)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
                }
            }
        }
    }

    /// Resolves once the socket loop has ended for good.
    pub async fn wait(&self) {
        self.finished.notified().await;
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            let _ = gateway_task.await;
        }

        state.is_logged_in = false;
        info!("slack client stopped");
        Ok(())
    }

    async fn socket_mode_loop(self) {
        let app_token = match self.app_token() {
            Ok(token) => token,
            Err(err) => {
                error!("{err}");
                return;
            }
        };

        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;
        loop {
            match self.open_socket_mode_url(&app_token).await {
                Ok(url) => match connect_async(url).await {
                    Ok((mut stream, _)) => {
                        retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;
                        info!("slack socket mode connected");
                        while let Some(frame) = stream.next().await {
                            match frame {
                                Ok(WsMessage::Text(text)) => {
                                    match self.handle_socket_text(&mut stream, &text).await {
                                        Ok(SocketControl::Continue) => {}
                                        Ok(SocketControl::Reconnect) => break,
                                        Err(err) => {
                                            warn!("socket payload handling failed: {}", err)
                                        }
                                    }
                                }
                                Ok(WsMessage::Ping(payload)) => {
                                    let _ = stream.send(WsMessage::Pong(payload)).await;
                                }
                                Ok(WsMessage::Close(_)) => break,
                                Ok(_) => {}
                                Err(err) => {
                                    warn!("socket frame error: {}", err);
                                    break;
                                }
                            }
                        }
                    }
                    Err(err) => warn!("failed to connect Slack websocket: {}", err),
                },
                Err(err) if is_fatal(&err) => {
                    error!("slack rejected the app token, stopping socket mode: {err}");
                    return;
                }
                Err(err) => warn!("failed to open Slack socket mode URL: {}", err),
            }

            if self.events.is_closed() {
                info!("event consumer is gone, stopping socket mode");
                return;
            }
            debug!("reconnecting to slack in {} seconds", retry_seconds);
            tokio::time::sleep(Duration::from_secs(retry_seconds)).await;
            retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
        }
    }

    async fn handle_socket_text(
        &self,
        stream: &mut SocketStream,
        text: &str,
    ) -> Result<SocketControl> {
        let payload: Value = serde_json::from_str(text).context("invalid socket payload JSON")?;

        if let Some(envelope_id) = envelope_id(&payload) {
            let ack = json!({ "envelope_id": envelope_id });
            stream
                .send(WsMessage::Text(ack.to_string().into()))
                .await
                .context("failed to ack slack envelope")?;
        }

        let identity = self.identity.read().await.clone();
        let event = match parse_socket_payload(&payload, &identity) {
            SocketFrame::Hello => ChatEvent::Connected,
            SocketFrame::Event(event) => event,
            SocketFrame::Disconnect { reason } => {
                info!("slack requested disconnect reason={}", reason);
                return Ok(SocketControl::Reconnect);
            }
            SocketFrame::Ignored => return Ok(SocketControl::Continue),
        };

        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("event consumer has stopped"))?;
        Ok(SocketControl::Continue)
    }

    async fn chat_post_message(&self, channel_id: &str, text: &str) -> Result<String> {
        let _guard = self.send_lock.lock().await;
        let bot_token = self.bot_token()?;
        let payload = json!({
            "channel": channel_id,
            "text": text,
            "unfurl_links": false,
            "unfurl_media": false
        });
        let response = self
            .slack_api_post("chat.postMessage", &bot_token, payload)
            .await?;

        let delay = self.config.limits.slack_send_delay;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        response
            .get("ts")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("chat.postMessage missing ts"))
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String> {
        let bot_token = self.bot_token()?;
        let value = self
            .slack_api_post("conversations.open", &bot_token, json!({ "users": user_id }))
            .await?;
        value
            .pointer("/channel/id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("conversations.open missing channel id"))
    }

    async fn add_reaction(&self, channel_id: &str, message_ts: &str, emoji: &str) -> Result<()> {
        let bot_token = self.bot_token()?;
        let payload = json!({
            "channel": channel_id,
            "timestamp": message_ts,
            "name": emoji
        });
        match self.slack_api_post("reactions.add", &bot_token, payload).await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .downcast_ref::<SlackApiError>()
                    .is_some_and(|e| e.code == "already_reacted") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn list_members(&self) -> Result<Vec<WorkspaceMember>> {
        let bot_token = self.bot_token()?;
        let limit = USERS_LIST_PAGE_SIZE.to_string();
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;

        for page_number in 1..=MAX_USERS_LIST_PAGES {
            let mut params = vec![("limit", limit.as_str())];
            if let Some(cursor) = cursor.as_deref() {
                params.push(("cursor", cursor));
            }
            let value = self.slack_api_get("users.list", &bot_token, &params).await?;

            let page = value
                .get("members")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("users.list missing members"))?;
            members.extend(page.iter().filter_map(parse_member));

            match next_page_cursor(&value, cursor.as_deref()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
            if page_number == MAX_USERS_LIST_PAGES {
                warn!(
                    "users.list still paginating after {} pages, keeping {} members",
                    MAX_USERS_LIST_PAGES,
                    members.len()
                );
            }
        }

        debug!("fetched {} workspace members", members.len());
        Ok(members)
    }

    async fn auth_test(&self) -> Result<OwnIdentity> {
        let bot_token = self.bot_token()?;
        let value = self.slack_api_post("auth.test", &bot_token, json!({})).await?;
        Ok(OwnIdentity {
            user_id: Some(
                value
                    .get("user_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("auth.test missing user_id"))?
                    .to_string(),
            ),
            bot_id: value
                .get("bot_id")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        })
    }

    async fn open_socket_mode_url(&self, app_token: &str) -> Result<String> {
        let value = self
            .slack_api_post("apps.connections.open", app_token, json!({}))
            .await?;
        value
            .get("url")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("apps.connections.open missing websocket URL"))
    }

    async fn slack_api_post(&self, method: &str, token: &str, payload: Value) -> Result<Value> {
        let response = self
            .http
            .post(api_url(method, &[])?)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("request to Slack API method {method} failed"))?;
        read_api_response(method, response).await
    }

    /// Read methods such as `users.list` only take query arguments.
    async fn slack_api_get(
        &self,
        method: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<Value> {
        let response = self
            .http
            .get(api_url(method, params)?)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("request to Slack API method {method} failed"))?;
        read_api_response(method, response).await
    }

    fn bot_token(&self) -> Result<String> {
        let token = self.config.auth.bot_token.trim();
        if token.is_empty() {
            return Err(anyhow!("auth.bot_token is empty"));
        }
        Ok(token.to_string())
    }

    fn app_token(&self) -> Result<String> {
        self.config
            .auth
            .app_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                anyhow!("auth.app_token is required for Slack Socket Mode (xapp- token)")
            })
    }
}

fn api_url(method: &str, params: &[(&str, &str)]) -> Result<reqwest::Url> {
    let base = format!("https://slack.com/api/{method}");
    let url = if params.is_empty() {
        reqwest::Url::parse(&base)
    } else {
        reqwest::Url::parse_with_params(&base, params)
    };
    url.with_context(|| format!("invalid Slack API URL for method {method}"))
}

async fn read_api_response(method: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let value: Value = response
        .json()
        .await
        .with_context(|| format!("Slack API method {method} returned non-JSON body"))?;

    if !status.is_success() {
        return Err(anyhow!(
            "Slack API {} failed status={} body={}",
            method,
            status,
            value
        ));
    }
    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let code = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(SlackApiError {
            method: method.to_string(),
            code: code.to_string(),
        }
        .into());
    }

    Ok(value)
}

/// Cursor for the next `users.list` page. A repeated cursor ends paging.
fn next_page_cursor(response: &Value, previous: Option<&str>) -> Option<String> {
    response
        .pointer("/response_metadata/next_cursor")
        .and_then(Value::as_str)
        .filter(|next| !next.is_empty() && Some(*next) != previous)
        .map(ToOwned::to_owned)
}

fn transport_error(err: anyhow::Error) -> AppError {
    AppError::Transport(format!("{err:#}"))
}

#[async_trait]
impl ChatTransport for SlackClient {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), AppError> {
        self.chat_post_message(channel_id, text)
            .await
            .map(|_| ())
            .map_err(transport_error)
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), AppError> {
        let channel_id = self
            .open_direct_channel(user_id)
            .await
            .map_err(transport_error)?;
        self.send_message(&channel_id, text).await
    }

    async fn add_acknowledgment(
        &self,
        channel_id: &str,
        message_ref: &str,
    ) -> Result<(), AppError> {
        self.add_reaction(channel_id, message_ref, ACKNOWLEDGMENT_REACTION)
            .await
            .map_err(transport_error)
    }

    async fn fetch_workspace_members(&self) -> Result<Vec<WorkspaceMember>, AppError> {
        self.list_members().await.map_err(transport_error)
    }
}
