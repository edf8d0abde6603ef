//! HTTP client tests against a mock Clouddriver/Front50.

use clouddriver::{
    ClouddriverClient, ClouddriverError, Front50Client, Front50Service, KatoService,
    OortService, ServiceConfig,
};
use pipeline::Artifact;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ServiceConfig {
    ServiceConfig {
        clouddriver_url: server.uri(),
        oort_url: None,
        front50_url: server.uri(),
        timeout_secs: 5,
    }
}

mod kato {
    use super::*;

    #[tokio::test]
    async fn test_request_operations_posts_batch() {
        let server = MockServer::start().await;
        let operation = json!({"deployManifest": {"account": "k8s", "manifests": []}});
        Mock::given(method("POST"))
            .and(path("/kubernetes/ops"))
            .and(body_json(json!([operation.clone()])))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "01HX", "resourceUri": "/task/01HX"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let task_id = client
            .request_operations("kubernetes", &[operation])
            .await
            .unwrap();

        assert_eq!(task_id.id, "01HX");
    }

    #[tokio::test]
    async fn test_lookup_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/01HX"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "01HX",
                "status": {"completed": true, "failed": false, "retryable": false},
                "history": [],
                "resultObjects": [{"manifestNamesByNamespace": {"default": ["deployment web"]}}]
            })))
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let task = client.lookup_task("01HX").await.unwrap();

        assert!(task.status.completed);
        assert_eq!(task.result_objects.len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_missing_task_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/task/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such task"))
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let err = client.lookup_task("gone").await.unwrap_err();

        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kubernetes/task/01HX/owner"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let err = client
            .lookup_task_owner("kubernetes", "01HX")
            .await
            .unwrap_err();

        assert!(matches!(err, ClouddriverError::Api { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_forced_retry_endpoints() {
        let server = MockServer::start().await;
        let task = json!({"id": "01HX", "status": {"completed": false}});
        Mock::given(method("GET"))
            .and(path("/kubernetes/task/01HX/owner"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"name": "clouddriver-abc"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/kubernetes/task/01HX/retryable"))
            .and(body_json(json!({"retryable": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(task.clone()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/kubernetes/task/01HX/restart"))
            .and(body_json(json!([{"deployManifest": {"account": "k8s"}}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(task))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let owner = client
            .lookup_task_owner("kubernetes", "01HX")
            .await
            .unwrap();
        client
            .update_task_retryability("kubernetes", "01HX", true)
            .await
            .unwrap();
        client
            .restart_task(
                "kubernetes",
                "01HX",
                &[json!({"deployManifest": {"account": "k8s"}})],
            )
            .await
            .unwrap();

        assert_eq!(owner.name, "clouddriver-abc");
    }

    #[tokio::test]
    async fn test_resume_task() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/task/01HX(:|%3A)resume$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "01HX"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        assert_eq!(client.resume_task("01HX").await.unwrap().id, "01HX");
    }
}

mod oort {
    use super::*;

    #[tokio::test]
    async fn test_get_manifest_encodes_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifests/k8s/default/deployment%20web"))
            .and(query_param("includeEvents", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "account": "k8s",
                "location": "default",
                "name": "deployment web",
                "manifest": {"kind": "Deployment"},
                "status": {
                    "stable": {"state": false, "message": "Waiting for rollout"},
                    "failed": {"state": false}
                },
                "warnings": [{"type": "deprecation", "message": "apps/v1beta1"}]
            })))
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let manifest = client
            .get_manifest("k8s", "default", "deployment web", false)
            .await
            .unwrap();

        assert!(!manifest.status.stable.state);
        assert_eq!(
            manifest.status.stable.message.as_deref(),
            Some("Waiting for rollout")
        );
        assert_eq!(manifest.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_get_cluster_manifests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/manifests/k8s/default/replicaSet/cluster/web/replicaSet%20web",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"kind": "replicaSet", "name": "web-v000", "namespace": "default"},
                {"kind": "replicaSet", "name": "web-v001", "namespace": "default"}
            ])))
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let manifests = client
            .get_cluster_manifests("k8s", "default", "replicaSet", "web", "replicaSet web")
            .await
            .unwrap();

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].full_resource_name(), "replicaSet web-v000");
    }

    #[tokio::test]
    async fn test_fetch_artifact_returns_raw_bytes() {
        let server = MockServer::start().await;
        let artifact = Artifact {
            artifact_type: Some("http/file".into()),
            reference: Some("https://example.com/deploy.yml".into()),
            ..Artifact::default()
        };
        Mock::given(method("PUT"))
            .and(path("/artifacts/fetch/"))
            .and(body_json(serde_json::to_value(&artifact).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_string("kind: Service\n"))
            .mount(&server)
            .await;

        let client = ClouddriverClient::new(&config(&server)).unwrap();
        let content = client.fetch_artifact(&artifact).await.unwrap();

        assert_eq!(content, b"kind: Service\n");
    }

    #[tokio::test]
    async fn test_separate_oort_url() {
        let writer = MockServer::start().await;
        let reader = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifests/k8s/default/pod%20web-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "pod web-1"})))
            .expect(1)
            .mount(&reader)
            .await;

        let config = ServiceConfig {
            oort_url: Some(reader.uri()),
            ..config(&writer)
        };
        let client = ClouddriverClient::new(&config).unwrap();
        let manifest = client
            .get_manifest("k8s", "default", "pod web-1", false)
            .await
            .unwrap();

        assert_eq!(manifest.name, "pod web-1");
    }
}

mod front50 {
    use super::*;

    #[tokio::test]
    async fn test_existing_application() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/applications/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "web",
                "email": "team@example.com",
                "cloudProviders": "kubernetes"
            })))
            .mount(&server)
            .await;

        let client = Front50Client::new(&config(&server)).unwrap();
        let application = client.get_application("web").await.unwrap().unwrap();

        assert_eq!(application.email.as_deref(), Some("team@example.com"));
        assert_eq!(application.details["cloudProviders"], json!("kubernetes"));
    }

    #[tokio::test]
    async fn test_missing_application_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/applications/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Front50Client::new(&config(&server)).unwrap();
        assert!(client.get_application("ghost").await.unwrap().is_none());
    }
}
