use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use onboard_api::app::{build_router, services};
use onboard_auth::IdentityClaims;
use onboard_infra::AppConfig;
use reqwest::StatusCode;
use serde_json::json;

const SECRET: &str = "test-secret";

const REQUESTERS: &str = "supplier-onboarding-requesters";
const PBP: &str = "supplier-onboarding-pbp";
const PROCUREMENT: &str = "supplier-onboarding-procurement";
const ADMINS: &str = "supplier-onboarding-admins";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory stores, bound to an ephemeral port.
        let config = AppConfig {
            token_secret: SECRET.into(),
            ..Default::default()
        };
        let services = services::build_services(&config)
            .await
            .expect("in-memory services");
        let app = build_router(services, &config.token_secret);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_token(email: &str, groups: &[&str]) -> String {
    let now = Utc::now();
    let claims = IdentityClaims {
        sub: email.to_string(),
        email: email.to_string(),
        name: email.split('@').next().unwrap_or_default().to_string(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode token")
}

async fn create_submission(client: &reqwest::Client, srv: &TestServer, token: &str, company: &str) -> serde_json::Value {
    let res = client
        .post(srv.url("/submissions"))
        .bearer_auth(token)
        .json(&json!({
            "companyName": company,
            "supplierContactEmail": "jo@acme.co.uk",
            "serviceDescription": "Clinical waste collection"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn roles_are_derived_from_groups() {
    let srv = TestServer::spawn().await;
    let token = mint_token("pat@nhs.net", &[PBP, "unrelated-group"]);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["email"], "pat@nhs.net");
    assert_eq!(body["roles"], json!(["PBP"]));
    assert_eq!(body["isAdmin"], false);
}

#[tokio::test]
async fn review_moves_submission_between_stage_queues() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let requester = mint_token("sarah.johnson@nhs.net", &[REQUESTERS]);
    let pbp = mint_token("pat@nhs.net", &[PBP]);
    let procurement = mint_token("pro@nhs.net", &[PROCUREMENT]);

    let created = create_submission(&client, &srv, &requester, "Acme Waste Ltd").await;
    let id = created["submissionId"].as_str().unwrap().to_string();
    assert_eq!(created["currentStage"], "pbp");

    let res = client
        .get(srv.url("/queues/pbp"))
        .bearer_auth(&pbp)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let queue: serde_json::Value = res.json().await.unwrap();
    assert!(queue["items"].as_array().unwrap().iter().any(|i| i["submissionId"] == id.as_str()));

    let res = client
        .post(srv.url(&format!("/submissions/{id}/reviews/pbp")))
        .bearer_auth(&pbp)
        .json(&json!({ "decision": "approved", "rationale": "Business case agreed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let reviewed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(reviewed["currentStage"], "procurement");

    // PBP cannot act for procurement.
    let res = client
        .post(srv.url(&format!("/submissions/{id}/reviews/procurement")))
        .bearer_auth(&pbp)
        .json(&json!({ "decision": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "access_denied");
    assert_eq!(body["reference"], id.as_str());

    let res = client
        .get(srv.url("/queues/procurement"))
        .bearer_auth(&procurement)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let queue: serde_json::Value = res.json().await.unwrap();
    let items = queue["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["submissionId"], id.as_str());
}

#[tokio::test]
async fn strangers_and_unknown_references_look_the_same() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let requester = mint_token("sarah.johnson@nhs.net", &[REQUESTERS]);
    let stranger = mint_token("someone@nhs.net", &[REQUESTERS]);

    let created = create_submission(&client, &srv, &requester, "Acme Waste Ltd").await;
    let id = created["submissionId"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/submissions/{id}")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/submissions/SUP-2024-ZZZZZ"))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .get(srv.url("/submissions/not-a-reference"))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_ignores_workflow_fields_and_honours_if_match() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let requester = mint_token("sarah.johnson@nhs.net", &[REQUESTERS]);

    let created = create_submission(&client, &srv, &requester, "Acme Waste Ltd").await;
    let id = created["submissionId"].as_str().unwrap();
    let version = created["version"].as_u64().unwrap();

    let res = client
        .patch(srv.url(&format!("/submissions/{id}")))
        .bearer_auth(&requester)
        .header("If-Match", format!("\"{version}\""))
        .json(&json!({ "status": "completed", "currentStage": "ap_control", "tradingName": "Acme" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("etag").and_then(|v| v.to_str().ok()),
        Some(format!("\"{}\"", version + 1).as_str())
    );
    let updated: serde_json::Value = res.json().await.unwrap();
    assert_eq!(updated["status"], created["status"]);
    assert_eq!(updated["currentStage"], "pbp");
    assert_eq!(updated["details"]["tradingName"], "Acme");

    // Same precondition again is now stale.
    let res = client
        .patch(srv.url(&format!("/submissions/{id}")))
        .bearer_auth(&requester)
        .header("If-Match", format!("\"{version}\""))
        .json(&json!({ "tradingName": "Acme Health" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn queue_requires_the_stage_role() {
    let srv = TestServer::spawn().await;
    let pbp = mint_token("pat@nhs.net", &[PBP]);

    let res = reqwest::Client::new()
        .get(srv.url("/queues/procurement"))
        .bearer_auth(pbp)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rejected_submission_is_closed_even_for_admin() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let requester = mint_token("sarah.johnson@nhs.net", &[REQUESTERS]);
    let pbp = mint_token("pat@nhs.net", &[PBP]);
    let admin = mint_token("admin@nhs.net", &[ADMINS]);

    let created = create_submission(&client, &srv, &requester, "Acme Waste Ltd").await;
    let id = created["submissionId"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/submissions/{id}/reviews/pbp")))
        .bearer_auth(&pbp)
        .json(&json!({ "decision": "rejected", "rationale": "No business need" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rejected: serde_json::Value = res.json().await.unwrap();
    assert_eq!(rejected["status"], "rejected");

    let res = client
        .post(srv.url(&format!("/submissions/{id}/reviews/pbp")))
        .bearer_auth(&admin)
        .json(&json!({ "decision": "approved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn uploads_up_to_the_document_limit_reach_the_service() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let requester = mint_token("sarah.johnson@nhs.net", &[REQUESTERS]);

    let created = create_submission(&client, &srv, &requester, "Acme Waste Ltd").await;
    let id = created["submissionId"].as_str().unwrap();
    let url = srv.url(&format!("/submissions/{id}/documents/bank_details?fileName=bank.pdf"));

    // Above axum's 2 MiB default, below the 10 MiB document limit.
    let res = client
        .post(&url)
        .bearer_auth(&requester)
        .body(vec![7u8; 3 * 1024 * 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let stored: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stored["documents"][0]["documentType"], "bank_details");

    let res = client
        .post(&url)
        .bearer_auth(&requester)
        .body(vec![7u8; 10 * 1024 * 1024 + 1])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}
