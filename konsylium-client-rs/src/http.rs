use std::cell::RefCell;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use forum_types::chat::RawConversation;
use forum_types::page::{
    CommentsPage, ConversationEnvelope, ConversationsList, HelpfulRequest, Listing, MessagesPage,
    NotificationsPage, OpenConversationRequest, PostEnvelope, PostsPage, RefreshResponse,
    RepliesPage, SendMessageRequest, VoteRequest,
};
use forum_types::post::RawPost;
use forum_types::{
    Comment, CommentId, Conversation, ConversationId, Message, MessageId, Notification,
    NotificationId, Post, PostFilter, PostId, UserId, decode,
};
use reqwest::cookie::Jar;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tidings::{Page, Vote};

use crate::api::{FollowTarget, ForumApi, VoteTarget};
use crate::{ClientConfig, ClientError, ConfigError};

/// One REST call, kept around so it can be replayed after a token refresh.
#[derive(Clone, Debug)]
struct Call {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl Call {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    fn cursor(self, name: &str, cursor: Option<DateTime<Utc>>) -> Self {
        match cursor {
            Some(at) => self.param(name, at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => self,
        }
    }

    fn params(mut self, params: &impl Serialize) -> Result<Self, ClientError> {
        if let Value::Object(fields) = serde_json::to_value(params)? {
            for (name, value) in fields {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                self.query.push((name, value));
            }
        }
        Ok(self)
    }

    fn json(mut self, body: &impl Serialize) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// [`ForumApi`] over HTTP. Sends the bearer token, and on 401/403 refreshes it once and retries.
///
/// Cookies the backend sets (the refresh cookie among them) are kept in a jar and sent back,
/// so `GET /refresh` carries the same credential a browser would.
#[derive(Debug)]
pub struct HttpApi {
    client: reqwest::Client,
    config: ClientConfig,
    cookies: Arc<Jar>,
    token: RefCell<Option<String>>,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let backend = Url::parse(&config.backend_url).map_err(|_| ConfigError::Invalid {
            name: "KONSYLIUM_BACKEND_URL",
            expected: "an absolute URL",
            value: config.backend_url.clone(),
        })?;
        let cookies = Arc::new(Jar::default());
        if let Some(cookie) = &config.refresh_cookie {
            cookies.add_cookie_str(&format!("{cookie}; Path=/"), &backend);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("konsylium-client/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .cookie_provider(Arc::clone(&cookies))
            .build()?;
        let token = RefCell::new(config.access_token.clone());
        Ok(Self {
            client,
            config,
            cookies,
            token,
        })
    }

    pub fn cookies(&self) -> &Arc<Jar> {
        &self.cookies
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn access_token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.token.borrow_mut() = token;
    }

    fn request(&self, call: &Call) -> RequestBuilder {
        let mut request = self
            .client
            .request(call.method.clone(), self.config.api_url(&call.path))
            .query(&call.query);
        if let Some(body) = &call.body {
            request = request.json(body);
        }
        if let Some(token) = self.token.borrow().as_deref() {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn execute(&self, call: Call) -> Result<String, ClientError> {
        let mut response = self.request(&call).send().await?;
        if is_auth_failure(response.status()) {
            log::info!(
                "{} {} refused with {}, refreshing access token",
                call.method,
                call.path,
                response.status()
            );
            self.refresh().await?;
            response = self.request(&call).send().await?;
            if is_auth_failure(response.status()) {
                return Err(ClientError::Unauthorized);
            }
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            log::warn!("{} {} failed with {status}", call.method, call.path);
            return Err(ClientError::Status { status, body });
        }
        Ok(body)
    }

    async fn execute_json<R: DeserializeOwned>(&self, call: Call) -> Result<R, ClientError> {
        let body = self.execute(call).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// `GET /refresh` with the cookies the client holds; stores the new access token.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let response = self
            .client
            .get(self.config.api_url("/refresh"))
            .send()
            .await?;
        let status = response.status();
        if is_auth_failure(status) {
            log::warn!("Token refresh refused with {status}");
            return Err(ClientError::Unauthorized);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status { status, body });
        }
        let refreshed: RefreshResponse = serde_json::from_str(&body)?;
        self.set_access_token(Some(refreshed.access_token));
        log::debug!("Access token refreshed");
        Ok(())
    }

    async fn listing<L: Listing>(
        &self,
        call: Call,
    ) -> Result<Page<<L::Raw as forum_types::Normalize>::Output>, ClientError> {
        Ok(self.execute_json::<L>(call).await?.into_page())
    }
}

/// Messages carry no pagination metadata: a full page, counted before unusable entries
/// are dropped, means there may be older ones.
fn message_page(list: MessagesPage, limit: usize) -> Page<Message> {
    let (mut page, sent) = list.into_counted_page();
    if sent > page.items.len() {
        log::debug!("Kept {} of {sent} messages", page.items.len());
    }
    page.has_more = Some(sent == limit);
    page
}

impl ForumApi for HttpApi {
    async fn fetch_posts(
        &self,
        filter: &PostFilter,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Post>, ClientError> {
        let call = Call::get("/posts").cursor("timestamp", cursor).params(filter)?;
        self.listing::<PostsPage>(call).await
    }

    async fn fetch_post(&self, id: PostId) -> Result<Post, ClientError> {
        let envelope: PostEnvelope = self.execute_json(Call::get(format!("/posts/{id}"))).await?;
        Ok(decode::<RawPost>(envelope.post)?)
    }

    async fn delete_post(&self, id: PostId) -> Result<(), ClientError> {
        self.execute(Call::new(Method::DELETE, format!("/posts/{id}")))
            .await
            .map(drop)
    }

    async fn fetch_comments(
        &self,
        post: PostId,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Page<Comment>, ClientError> {
        let call = Call::get(format!("/posts/{post}/comments")).cursor("timestamp", cursor);
        self.listing::<CommentsPage>(call).await
    }

    async fn fetch_replies(&self, parent: CommentId) -> Result<Page<Comment>, ClientError> {
        let mut page = self
            .listing::<RepliesPage>(Call::get(format!("/comments/{parent}/replies")))
            .await?;
        // absent means no more
        page.has_more = Some(page.has_more.unwrap_or(false));
        Ok(page)
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), ClientError> {
        self.execute(Call::new(Method::DELETE, format!("/comments/{id}")))
            .await
            .map(drop)
    }

    async fn vote(&self, target: VoteTarget, value: Vote) -> Result<(), ClientError> {
        let call = Call::new(Method::PUT, target.path()).json(&VoteRequest { value })?;
        self.execute(call).await.map(drop)
    }

    async fn set_helpful(&self, comment: CommentId, helpful: bool) -> Result<(), ClientError> {
        let call = Call::new(Method::PUT, format!("/comments/{comment}/helpful")).json(
            &HelpfulRequest {
                is_helpful: helpful,
            },
        )?;
        self.execute(call).await.map(drop)
    }

    async fn set_following(&self, target: FollowTarget, follow: bool) -> Result<(), ClientError> {
        let method = if follow { Method::POST } else { Method::DELETE };
        self.execute(Call::new(method, target.path())).await.map(drop)
    }

    async fn fetch_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let list: ConversationsList = self.execute_json(Call::get("/conversations")).await?;
        Ok(list.into_page().items)
    }

    async fn open_conversation(&self, with: UserId) -> Result<Conversation, ClientError> {
        let call = Call::new(Method::POST, "/conversations")
            .json(&OpenConversationRequest { user_id: with })?;
        let envelope: ConversationEnvelope = self.execute_json(call).await?;
        Ok(decode::<RawConversation>(envelope.conversation)?)
    }

    async fn fetch_messages(
        &self,
        conversation: ConversationId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Page<Message>, ClientError> {
        // the server pages messages by its own fixed size
        let call = Call::get(format!("/conversations/{conversation}/messages")).cursor("before", before);
        let list = self.execute_json::<MessagesPage>(call).await?;
        Ok(message_page(list, limit))
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<(), ClientError> {
        let call = Call::new(Method::POST, format!("/conversations/{conversation}/messages"))
            .json(&SendMessageRequest {
                content: content.to_string(),
            })?;
        self.execute(call).await.map(drop)
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), ClientError> {
        self.execute(Call::new(Method::DELETE, format!("/messages/{id}")))
            .await
            .map(drop)
    }

    async fn fetch_notifications(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Page<Notification>, ClientError> {
        let call = Call::get("/notifications")
            .param("limit", limit)
            .cursor("before", before);
        let mut page = self.listing::<NotificationsPage>(call).await?;
        page.has_more = Some(page.has_more.unwrap_or(false) && !page.items.is_empty());
        Ok(page)
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), ClientError> {
        self.execute(Call::new(Method::PATCH, format!("/notifications/{id}/read")))
            .await
            .map(drop)
    }
}
