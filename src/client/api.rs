use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use url::Url;

use crate::{
    auth::handlers::TokenPair,
    client::{
        config::ClientConfig,
        error::ClientError,
        invalidation::InvalidationBus,
        table::{PageFetcher, TableState},
    },
    listing::Page,
    model::resource::Resource,
    models::MessageResponse,
};

/// HTTP client for the portal API. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    access_token: Arc<RwLock<Option<String>>>,
    bus: InvalidationBus,
}

impl PortalClient {
    pub fn new(config: ClientConfig, bus: InvalidationBus) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            access_token: Arc::new(RwLock::new(None)),
            bus,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub fn set_access_token(&self, token: Option<String>) {
        if let Ok(mut slot) = self.access_token.write() {
            *slot = token;
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        let token = self.access_token.read().ok().and_then(|t| t.clone());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.bytes().await?;
        let err = ClientError::from_response(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), error = %err, "API call failed");
        Err(err)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ClientError> {
        let url = self.config.endpoint("auth/login")?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let tokens: TokenPair = Self::decode(response).await?;
        self.set_access_token(Some(tokens.access_token.clone()));
        Ok(tokens)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.config.endpoint(path)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::decode(response).await
    }

    /// One page of a list endpoint for the given table state.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        state: &TableState,
        search: Option<&str>,
    ) -> Result<Page<T>, ClientError> {
        let mut url = self.config.endpoint(path)?;
        url.query_pairs_mut()
            .extend_pairs(state.request_pairs(search));
        let response = self.request(Method::GET, url).send().await?;
        Self::decode(response).await
    }

    /// Sends a mutation and, on success, announces that lists of `resource` changed.
    pub async fn mutate<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        resource: Resource,
    ) -> Result<MessageResponse, ClientError> {
        let url = self.config.endpoint(path)?;
        let mut request = self.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let message: MessageResponse = Self::decode(response).await?;

        self.bus.publish(resource);
        Ok(message)
    }

    /// Table data source for one list endpoint.
    pub fn table<T>(&self, path: impl Into<String>) -> ResourceTable<T> {
        ResourceTable {
            client: self.clone(),
            path: path.into(),
            _row: PhantomData,
        }
    }
}

pub struct ResourceTable<T> {
    client: PortalClient,
    path: String,
    _row: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> PageFetcher for ResourceTable<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Row = T;

    async fn list(&self, state: &TableState) -> Result<Page<T>, ClientError> {
        self.client.list(&self.path, state, None).await
    }

    async fn search(&self, term: &str, state: &TableState) -> Result<Page<T>, ClientError> {
        self.client.list(&self.path, state, Some(term)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PortalClient {
        PortalClient::new(
            ClientConfig::new("http://localhost:8080").unwrap(),
            InvalidationBus::default(),
        )
        .unwrap()
    }

    #[test]
    fn requests_carry_bearer_token_once_set() {
        let client = client();
        let url = client.config().endpoint("leave/mine").unwrap();

        let req = client.request(Method::GET, url.clone()).build().unwrap();
        assert!(req.headers().get("authorization").is_none());

        client.set_access_token(Some("abc".into()));
        let req = client.request(Method::GET, url).build().unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer abc");
    }

    #[test]
    fn list_url_carries_table_state() {
        let client = client();
        let mut state = TableState::new(10);
        state.toggle_facet("status", "pending");

        let mut url = client.config().endpoint("leave").unwrap();
        url.query_pairs_mut()
            .extend_pairs(state.request_pairs(Some(" ann ")));
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/leave?page=1&limit=10&search=ann&status=pending"
        );
    }

    fn serve_leave_api() -> String {
        use actix_web::{App, HttpResponse, HttpServer, web};

        let server = HttpServer::new(|| {
            App::new()
                .route(
                    "/api/leave/1/approve",
                    web::put().to(|| async {
                        HttpResponse::Ok().json(MessageResponse::new("Leave approved"))
                    }),
                )
                .route(
                    "/api/leave/2/approve",
                    web::put().to(|| async {
                        HttpResponse::Conflict().json(serde_json::json!({
                            "message": "Leave request not found or already processed"
                        }))
                    }),
                )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{addr}")
    }

    #[actix_web::test]
    async fn approving_reloads_every_leave_table() {
        let base = serve_leave_api();
        let bus = InvalidationBus::default();
        let mut review_table = bus.subscribe(Resource::Leave);
        let mut events_table = bus.subscribe(Resource::Events);
        let client = PortalClient::new(ClientConfig::new(&base).unwrap(), bus).unwrap();

        let msg = client
            .mutate::<()>(Method::PUT, "leave/1/approve", None, Resource::Leave)
            .await
            .unwrap();
        assert_eq!(msg.message, "Leave approved");
        assert_eq!(review_table.next().await, Some(()));
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), events_table.next())
                .await
                .is_err()
        );
    }

    #[actix_web::test]
    async fn rejected_mutation_surfaces_message_without_reload() {
        let base = serve_leave_api();
        let bus = InvalidationBus::default();
        let mut leave = bus.subscribe(Resource::Leave);
        let client = PortalClient::new(ClientConfig::new(&base).unwrap(), bus).unwrap();

        let err = client
            .mutate::<()>(Method::PUT, "leave/2/approve", None, Resource::Leave)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.toast_message(), "Leave request not found or already processed");
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), leave.next())
                .await
                .is_err()
        );
    }
}
