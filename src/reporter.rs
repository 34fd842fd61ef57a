//! Drives the role assignment report for one subscription.

use tracing::{info, warn};

use crate::arm::ArmClient;
use crate::error::{Error, Result};
use crate::graph::GraphClient;

/// Placeholder display name for principals with no directory object.
const UNKNOWN_PRINCIPAL: &str = "unknown";

/// One record of the report, in role-assignment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Role name joined from the definitions in scope; `None` when the
    /// assignment references a definition outside the loaded set.
    pub role_name: Option<String>,
    pub display_name: String,
    pub mail: Option<String>,
}

/// Outcome of the assignment-listing phase.
#[derive(Debug)]
pub enum ReportStatus {
    /// Every assignment was listed and resolved.
    Complete,
    /// Listing was abandoned part-way. The reason is preserved so callers
    /// can tell a permission refusal from a subscription with no
    /// assignments.
    Incomplete(Error),
}

/// The assembled report for one subscription.
#[derive(Debug)]
pub struct Report {
    pub subscription_id: String,
    pub entries: Vec<ReportEntry>,
    pub status: ReportStatus,
}

/// Resolves a subscription's role assignments into human-readable records.
pub struct Reporter {
    arm: ArmClient,
    graph: GraphClient,
}

impl Reporter {
    pub fn new(arm: ArmClient, graph: GraphClient) -> Self {
        Self { arm, graph }
    }

    /// Build the report for `subscription_id`.
    ///
    /// A subscription that is not visible to the credential is an error,
    /// raised before any authorization or directory call is issued.
    /// Failures after that point do not fail the run: the entries collected
    /// so far are returned under an `Incomplete` status carrying the reason.
    pub async fn run(&self, subscription_id: &str) -> Result<Report> {
        info!(subscription_id, "Collecting role assignments for subscription");

        let subscription = self.arm.find_subscription(subscription_id).await?;
        info!(
            subscription_id,
            name = subscription.display_name.as_deref().unwrap_or("-"),
            "Subscription resolved"
        );

        let mut entries = Vec::new();
        let status = match self
            .collect(&subscription.subscription_id, &mut entries)
            .await
        {
            Ok(()) => ReportStatus::Complete,
            Err(e) => ReportStatus::Incomplete(e),
        };

        Ok(Report {
            subscription_id: subscription.subscription_id,
            entries,
            status,
        })
    }

    async fn collect(&self, subscription_id: &str, entries: &mut Vec<ReportEntry>) -> Result<()> {
        let scope = format!("/subscriptions/{}", subscription_id);
        let role_names = self.arm.role_definitions(&scope).await?;
        let assignments = self.arm.role_assignments(subscription_id).await?;
        info!(
            assignments = assignments.len(),
            definitions = role_names.len(),
            "Resolving assigned principals"
        );

        for assignment in assignments {
            let role_name = role_names.get(&assignment.role_definition_id).cloned();
            let (display_name, mail) = self.resolve_principal(&assignment.principal_id).await?;
            entries.push(ReportEntry {
                role_name,
                display_name,
                mail,
            });
        }
        Ok(())
    }

    /// Resolve a principal to its display name and mail. A lookup that
    /// returns no object is a soft miss, not an error.
    async fn resolve_principal(&self, principal_id: &str) -> Result<(String, Option<String>)> {
        let objects = self.graph.get_objects_by_ids(&[principal_id]).await?;
        match objects.into_iter().next() {
            Some(object) => Ok((object.display_name, object.mail)),
            None => {
                warn!(principal_id, "No directory object found for principal");
                Ok((UNKNOWN_PRINCIPAL.to_string(), None))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::ArmClient;
    use crate::credentials::StaticTokenCredential;
    use crate::graph::GraphClient;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TENANT: &str = "11111111-1111-1111-1111-111111111111";
    const SUB: &str = "22222222-2222-2222-2222-222222222222";

    fn reporter(server: &MockServer) -> Reporter {
        let http = reqwest::Client::new();
        let arm = ArmClient::new(
            http.clone(),
            Box::new(StaticTokenCredential("arm-token".into())),
        )
        .with_base_url(&server.uri());
        let graph = GraphClient::new(
            http,
            Box::new(StaticTokenCredential("graph-token".into())),
            TENANT,
        )
        .with_base_url(&server.uri());
        Reporter::new(arm, graph)
    }

    fn definition_id(guid: &str) -> String {
        format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
            SUB, guid
        )
    }

    fn assignment(principal_id: &str, role_definition_id: &str) -> Value {
        json!({
            "properties": {
                "principalId": principal_id,
                "roleDefinitionId": role_definition_id,
            }
        })
    }

    async fn mock_subscription_list(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "subscriptionId": "00000000-aaaa-0000-0000-000000000000", "displayName": "Sandbox" },
                    { "subscriptionId": SUB, "displayName": "Production" },
                ]
            })))
            .mount(server)
            .await;
    }

    async fn mock_definitions(server: &MockServer, definitions: Value) {
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions",
                SUB
            )))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": definitions })),
            )
            .mount(server)
            .await;
    }

    async fn mock_assignments(server: &MockServer, assignments: Value) {
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleAssignments",
                SUB
            )))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "value": assignments })),
            )
            .mount(server)
            .await;
    }

    async fn mock_principal(server: &MockServer, principal_id: &str, objects: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/getObjectsByObjectIds", TENANT)))
            .and(body_partial_json(json!({ "objectIds": [principal_id] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": objects })))
            .mount(server)
            .await;
    }

    async fn mock_principal_denied(server: &MockServer, principal_id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/getObjectsByObjectIds", TENANT)))
            .and(body_partial_json(json!({ "objectIds": [principal_id] })))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "odata.error": {
                    "code": "Authorization_RequestDenied",
                    "message": { "lang": "en", "value": "Insufficient privileges to complete the operation." }
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn report_joins_roles_and_resolves_principals() {
        let server = MockServer::start().await;
        mock_subscription_list(&server).await;
        mock_definitions(
            &server,
            json!([
                { "id": definition_id("owner"), "properties": { "roleName": "Owner" } },
            ]),
        )
        .await;
        mock_assignments(
            &server,
            json!([
                assignment("p1", &definition_id("owner")),
                assignment("p2", &definition_id("absent")),
            ]),
        )
        .await;
        mock_principal(
            &server,
            "p1",
            json!([{ "objectType": "User", "displayName": "Alice", "mail": "alice@example.com" }]),
        )
        .await;
        mock_principal(&server, "p2", json!([])).await;

        let report = reporter(&server).run(SUB).await.unwrap();

        assert!(matches!(report.status, ReportStatus::Complete));
        assert_eq!(report.subscription_id, SUB);
        assert_eq!(
            report.entries,
            vec![
                ReportEntry {
                    role_name: Some("Owner".into()),
                    display_name: "Alice".into(),
                    mail: Some("alice@example.com".into()),
                },
                ReportEntry {
                    role_name: None,
                    display_name: "unknown".into(),
                    mail: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_subscription_fails_before_authorization_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "subscriptionId": "00000000-aaaa-0000-0000-000000000000" },
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r".*Microsoft\.Authorization.*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r".*getObjectsByObjectIds.*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let err = reporter(&server).run(SUB).await.unwrap_err();
        match err {
            Error::SubscriptionNotFound { subscription_id } => assert_eq!(subscription_id, SUB),
            other => panic!("expected SubscriptionNotFound, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn subscription_with_no_assignments_reports_nothing() {
        let server = MockServer::start().await;
        mock_subscription_list(&server).await;
        mock_definitions(
            &server,
            json!([
                { "id": definition_id("owner"), "properties": { "roleName": "Owner" } },
            ]),
        )
        .await;
        mock_assignments(&server, json!([])).await;

        let report = reporter(&server).run(SUB).await.unwrap();
        assert!(matches!(report.status, ReportStatus::Complete));
        assert!(report.entries.is_empty());
    }

    #[tokio::test]
    async fn denied_listing_marks_report_incomplete() {
        let server = MockServer::start().await;
        mock_subscription_list(&server).await;
        Mock::given(method("GET"))
            .and(path(format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions",
                SUB
            )))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": "AuthorizationFailed",
                    "message": "The client does not have authorization to perform action",
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r".*getObjectsByObjectIds.*"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
            .expect(0)
            .mount(&server)
            .await;

        let report = reporter(&server).run(SUB).await.unwrap();
        assert!(report.entries.is_empty());
        match &report.status {
            ReportStatus::Incomplete(Error::Api { status, code, .. }) => {
                assert_eq!(*status, 403);
                assert_eq!(code, "AuthorizationFailed");
            }
            other => panic!("expected Incomplete(Api), got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn directory_failure_keeps_earlier_entries() {
        let server = MockServer::start().await;
        mock_subscription_list(&server).await;
        mock_definitions(
            &server,
            json!([
                { "id": definition_id("owner"), "properties": { "roleName": "Owner" } },
            ]),
        )
        .await;
        mock_assignments(
            &server,
            json!([
                assignment("p1", &definition_id("owner")),
                assignment("p2", &definition_id("owner")),
            ]),
        )
        .await;
        mock_principal(
            &server,
            "p1",
            json!([{ "objectType": "User", "displayName": "Alice", "mail": "alice@example.com" }]),
        )
        .await;
        mock_principal_denied(&server, "p2").await;

        let report = reporter(&server).run(SUB).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].display_name, "Alice");
        assert!(matches!(
            report.status,
            ReportStatus::Incomplete(Error::Api { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn principal_without_mail_yields_none() {
        let server = MockServer::start().await;
        mock_subscription_list(&server).await;
        mock_definitions(
            &server,
            json!([
                { "id": definition_id("owner"), "properties": { "roleName": "Owner" } },
            ]),
        )
        .await;
        mock_assignments(&server, json!([assignment("p3", &definition_id("owner"))])).await;
        mock_principal(
            &server,
            "p3",
            json!([{ "objectType": "ServicePrincipal", "displayName": "deploy-pipeline" }]),
        )
        .await;

        let report = reporter(&server).run(SUB).await.unwrap();
        assert_eq!(
            report.entries,
            vec![ReportEntry {
                role_name: Some("Owner".into()),
                display_name: "deploy-pipeline".into(),
                mail: None,
            }]
        );
    }

    #[tokio::test]
    async fn repeated_runs_produce_identical_entries() {
        let server = MockServer::start().await;
        mock_subscription_list(&server).await;
        mock_definitions(
            &server,
            json!([
                { "id": definition_id("owner"), "properties": { "roleName": "Owner" } },
            ]),
        )
        .await;
        mock_assignments(&server, json!([assignment("p1", &definition_id("owner"))])).await;
        mock_principal(
            &server,
            "p1",
            json!([{ "objectType": "User", "displayName": "Alice", "mail": "alice@example.com" }]),
        )
        .await;

        let runner = reporter(&server);
        let first = runner.run(SUB).await.unwrap();
        let second = runner.run(SUB).await.unwrap();

        assert!(matches!(first.status, ReportStatus::Complete));
        assert!(matches!(second.status, ReportStatus::Complete));
        assert_eq!(first.entries, second.entries);
    }
}
