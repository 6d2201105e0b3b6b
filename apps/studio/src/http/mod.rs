//! Authenticated request layer: the single point of entry for all calls to the document service.
//!
//! RULE: no other module talks to `Transport` directly. Everything goes through
//! `ApiClient::send`, which owns the refresh-once-then-retry protocol.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::models::draft::{
    DocumentId, HistoryPage, ReviseRequest, Version, VersionId, VersionPatch,
};
use crate::models::task::{GenerateRequest, TaskAccepted, TaskResultEnvelope};

pub mod auth;
pub mod notices;
#[cfg(test)]
pub mod testing;
pub mod transport;

use auth::AuthSession;
use notices::Notices;
use transport::{ApiRequest, RawResponse, RequestKind, Transport};

const REFRESH_PATH: &str = "api/accounts/token/refresh/";
const SESSION_CHECK_PATH: &str = "api/accounts/me/";
const LOGIN_PATH: &str = "api/accounts/login/";
const LOGOUT_PATH: &str = "api/accounts/logout/";
const GENERATE_PATH: &str = "api/generate-resume-and-cover-letter/";
const REVISE_PATH: &str = "api/update-content/";

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    auth: AuthSession,
    notices: Notices,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, auth: AuthSession, notices: Notices) -> Self {
        Self {
            transport,
            auth,
            notices,
        }
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Sends a request, transparently recovering from one expired credential.
    ///
    /// On 401 (and only if the request is not the refresh call itself) a single
    /// refresh is issued and the request is re-sent once. The re-send goes
    /// straight to the transport, so a second 401 is final and no request ever
    /// triggers more than one refresh. A failed refresh invalidates the
    /// `AuthSession` and returns the original error.
    pub async fn send(&self, request: ApiRequest) -> Result<RawResponse, ClientError> {
        let err = match self.attempt(&request).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if !(err.is_unauthorized() && request.may_refresh()) {
            self.surface(&request, &err);
            return Err(err);
        }

        info!("{} {} got 401, refreshing credentials", request.method, request.path);
        if let Err(refresh_err) = self.refresh().await {
            warn!("Credential refresh failed: {refresh_err}");
            self.auth.invalidate();
            return Err(err);
        }

        let retried = self.attempt(&request).await;
        if let Err(e) = &retried {
            self.surface(&request, e);
        }
        retried
    }

    async fn attempt(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        let response = self.transport.execute(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::from_status(response.status, &response.body))
        }
    }

    async fn refresh(&self) -> Result<(), ClientError> {
        let request = ApiRequest::post(REFRESH_PATH).kind(RequestKind::Refresh);
        self.attempt(&request).await.map(|_| ())
    }

    fn surface(&self, request: &ApiRequest, err: &ClientError) {
        if request.is_silent() {
            debug!("{} {} failed silently: {err}", request.method, request.path);
        } else {
            self.notices.report(err);
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        self.send(request).await?.json()
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        #[derive(Serialize)]
        struct LoginBody<'a> {
            username: &'a str,
            email: &'a str,
            password: &'a str,
        }
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginBody {
            username: "",
            email,
            password,
        })?;
        self.send(request).await?;
        self.auth.reinitialize();
        info!("Signed in as {email}");
        Ok(())
    }

    /// Background liveness check. Never surfaces errors.
    pub async fn check_session(&self) -> bool {
        let request = ApiRequest::get(SESSION_CHECK_PATH).kind(RequestKind::SessionCheck);
        self.send(request).await.is_ok()
    }

    /// Silent: the caller is shutting down and only logs the failure.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.send(ApiRequest::post(LOGOUT_PATH).silent()).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Generation tasks
    // ------------------------------------------------------------------------

    pub async fn start_generation(&self, body: &GenerateRequest) -> Result<String, ClientError> {
        let accepted: TaskAccepted = self
            .send_json(ApiRequest::post(GENERATE_PATH).json(body)?)
            .await?;
        Ok(accepted.task_id)
    }

    pub async fn task_result(&self, task_id: &str) -> Result<TaskResultEnvelope, ClientError> {
        self.send_json(ApiRequest::get(format!("api/task-result/{task_id}/")))
            .await
    }

    // ------------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------------

    pub async fn get_version(&self, id: VersionId) -> Result<Version, ClientError> {
        self.send_json(ApiRequest::get(format!("api/document-version/{id}/")))
            .await
    }

    /// Persists edits. The service answers with a new version; the old one is untouched.
    pub async fn patch_version(
        &self,
        id: VersionId,
        patch: &VersionPatch,
    ) -> Result<Version, ClientError> {
        self.send_json(ApiRequest::patch(format!("api/document-version/{id}/")).json(patch)?)
            .await
    }

    pub async fn revise_content(
        &self,
        id: VersionId,
        instructions: &str,
    ) -> Result<Version, ClientError> {
        let body = ReviseRequest {
            document_version_id: id,
            instructions: instructions.to_string(),
        };
        self.send_json(ApiRequest::post(REVISE_PATH).json(&body)?)
            .await
    }

    pub async fn export_version(&self, id: VersionId) -> Result<RawResponse, ClientError> {
        self.send(ApiRequest::get(format!("api/document-version/{id}/pdf/")))
            .await
    }

    /// First page when `page_url` is `None`, otherwise follows a `next` link.
    pub async fn version_history(
        &self,
        document: DocumentId,
        page_url: Option<&str>,
    ) -> Result<HistoryPage, ClientError> {
        let path = page_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("api/document/{document}/versions/"));
        self.send_json(ApiRequest::get(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{client, ScriptedTransport};
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_success_passes_through_untouched() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"task_id": "t-1"}));
        let api = client(&transport);

        let body = GenerateRequest::new(1, 2, crate::models::task::GenerateCommand::GenerateResume);
        assert_eq!(api.start_generation(&body).await.unwrap(), "t-1");
        assert_eq!(transport.lines(), vec![format!("POST {GENERATE_PATH}")]);
    }

    #[tokio::test]
    async fn test_expired_credential_is_invisible_to_caller() {
        let transport = ScriptedTransport::new();
        transport
            .push_status(401)
            .push_status(200)
            .push_json(200, json!({"task_id": "t-9"}));
        let api = client(&transport);
        let mut notices = api.notices().subscribe();

        let body = GenerateRequest::new(1, 2, crate::models::task::GenerateCommand::GenerateBoth);
        assert_eq!(api.start_generation(&body).await.unwrap(), "t-9");
        assert_eq!(
            transport.lines(),
            vec![
                format!("POST {GENERATE_PATH}"),
                format!("POST {REFRESH_PATH}"),
                format!("POST {GENERATE_PATH}"),
            ]
        );
        assert!(api.auth().is_valid());
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_final() {
        let transport = ScriptedTransport::new();
        transport.push_status(401).push_status(200).push_status(401);
        let api = client(&transport);
        let mut notices = api.notices().subscribe();

        let err = api.get_version(VersionId(5)).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(notices.try_recv().unwrap().message, "Please sign in again");
        assert!(notices.try_recv().is_err());
        assert!(api.auth().is_valid());
        let refreshes = transport
            .lines()
            .iter()
            .filter(|l| l.ends_with(REFRESH_PATH))
            .count();
        assert_eq!(refreshes, 1);
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_invalidates_session_once() {
        let transport = ScriptedTransport::new();
        transport
            .push_status(401)
            .push_status(401)
            .push_status(401)
            .push_network_error();
        let api = client(&transport);
        let mut auth_rx = api.auth().subscribe();
        let mut notices = api.notices().subscribe();

        let first = api.get_version(VersionId(5)).await.unwrap_err();
        assert!(first.is_unauthorized());
        assert!(!api.auth().is_valid());
        assert!(auth_rx.has_changed().unwrap());
        auth_rx.borrow_and_update();

        // A second request failing the same way does not re-emit the signal.
        let second = api.get_version(VersionId(6)).await.unwrap_err();
        assert!(second.is_unauthorized());
        assert!(!auth_rx.has_changed().unwrap());
        assert_eq!(transport.calls().len(), 4);
        // The invalid-session signal replaces the notice.
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_endpoint_never_refreshes_itself() {
        let transport = ScriptedTransport::new();
        transport.push_status(401);
        let api = client(&transport);

        let err = api
            .send(ApiRequest::post(REFRESH_PATH).kind(RequestKind::Refresh))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_auth_failures_are_reported_unless_silent() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(500, json!({"detail": "boom"}))
            .push_status(503)
            .push_network_error();
        let api = client(&transport);
        let mut notices = api.notices().subscribe();

        let err = api.get_version(VersionId(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.message, "Server error");
        assert!(notice.detail.unwrap().contains("boom"));

        assert!(!api.check_session().await);
        assert!(notices.try_recv().is_err());

        let err = api.get_version(VersionId(1)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(notices.try_recv().unwrap().message, "Could not reach the server");
    }

    #[tokio::test]
    async fn test_silent_request_failure_emits_no_notice() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(500, json!({"detail": "boom"}))
            .push_status(502);
        let api = client(&transport);
        let mut notices = api.notices().subscribe();

        let err = api
            .send(ApiRequest::get("api/document-version/1/").silent())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 500, .. }));
        assert!(notices.try_recv().is_err());

        let err = api.logout().await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 502, .. }));
        assert!(notices.try_recv().is_err());
        assert_eq!(transport.lines()[1], format!("POST {LOGOUT_PATH}"));
    }

    #[tokio::test]
    async fn test_login_reinitializes_session() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"user": {"id": 1}}));
        let api = client(&transport);
        api.auth().invalidate();

        api.login("jane@example.com", "pw").await.unwrap();
        assert!(api.auth().is_valid());
        assert_eq!(
            transport.calls()[0].body.as_ref().unwrap()["email"],
            "jane@example.com"
        );
    }
}
