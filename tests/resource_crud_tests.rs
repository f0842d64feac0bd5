//! End-to-end tests of the five generated verbs over HTTP

mod common;

use axum::http::StatusCode;
use common::*;
use modelrouter::prelude::*;

#[tokio::test]
async fn test_create_returns_201_with_system_fields() {
    let server = food_server().await;

    let response = server
        .post("/food")
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Broccoli", "calories": 34, "ownerId": OWNER}))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    let data = &body["data"];
    assert_eq!(data["name"], "Broccoli");
    assert_eq!(data["calories"], 34);
    assert!(data["_id"].is_string());
    assert!(data["created"].is_string());
    assert_eq!(data["created"], data["updated"]);
}

#[tokio::test]
async fn test_create_drops_client_system_fields() {
    let server = food_server().await;

    let response = server
        .post("/food")
        .add_header("x-requester-id", OWNER)
        .json(&json!({
            "_id": "chosen",
            "created": "1999-01-01T00:00:00.000Z",
            "name": "Kale",
            "ownerId": OWNER
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_ne!(body["data"]["_id"], "chosen");
    assert_ne!(body["data"]["created"], "1999-01-01T00:00:00.000Z");
}

#[tokio::test]
async fn test_create_requires_authentication() {
    let server = food_server().await;

    let response = server.post("/food").json(&json!({"name": "Kale"})).await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["status"], 403);
    assert_eq!(body["title"], "Access to POST on Food not allowed");
}

#[tokio::test]
async fn test_create_rejects_fields_outside_write_set() {
    let server = food_server().await;

    // without ownerId the creator is only "authenticated", who may not write `hidden`
    let response = server
        .post("/food")
        .add_header("x-requester-id", STRANGER)
        .json(&json!({"name": "Kale", "hidden": true}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["title"], "User of type auth cannot write fields: hidden");
}

#[tokio::test]
async fn test_create_with_invalid_body_is_400() {
    let server = food_server().await;

    let response = server
        .post("/food")
        .add_header("x-requester-id", OWNER)
        .json(&json!({"calories": "lots"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["title"], "Validation failed");
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("name is required"), "{detail}");
    assert!(detail.contains("calories must be of type number"), "{detail}");
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let server = food_server().await;

    let response = server
        .post("/food")
        .add_header("x-requester-id", OWNER)
        .bytes(axum::body::Bytes::from_static(b"{not json"))
        .content_type("application/json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["title"], "Invalid JSON body");
}

#[tokio::test]
async fn test_read_hides_fields_from_anonymous_callers() {
    let server = food_server().await;
    let body = json!({"name": "Kale", "hidden": true, "ownerId": OWNER});
    let id = create_food(&server, OWNER, body).await;

    let anonymous: Value = server.get(&format!("/food/{id}")).await.json();
    assert_eq!(anonymous["data"]["name"], "Kale");
    assert!(anonymous["data"].get("hidden").is_none());

    let owner: Value = server
        .get(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .await
        .json();
    assert_eq!(owner["data"]["hidden"], true);
}

#[tokio::test]
async fn test_read_unknown_document_is_404() {
    let server = food_server().await;

    let response = server.get("/food/does-not-exist").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["title"], "Document does-not-exist not found");
}

#[tokio::test]
async fn test_owner_updates_and_stranger_is_refused() {
    let server = food_server().await;
    let body = json!({"name": "Kale", "calories": 10, "ownerId": OWNER});
    let id = create_food(&server, OWNER, body).await;

    let refused = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", STRANGER)
        .json(&json!({"calories": 20}))
        .await;
    refused.assert_status(StatusCode::FORBIDDEN);

    let response = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .json(&json!({"calories": 20}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["calories"], 20);
    assert_eq!(body["data"]["name"], "Kale");
}

#[tokio::test]
async fn test_admin_may_update_any_document() {
    let server = food_server().await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", ADMIN)
        .add_header("x-requester-admin", "true")
        .json(&json!({"hidden": true}))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_pre_update_returning_null_denies_update() {
    let server = food_server().await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Forbidden"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["title"], "Update not allowed");

    let unchanged: Value = server.get(&format!("/food/{id}")).await.json();
    assert_eq!(unchanged["data"]["name"], "Kale");
}

#[tokio::test]
async fn test_delete_returns_204_then_404() {
    let server = food_server().await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .delete(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    server
        .get(&format!("/food/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disabled_operation_is_405() {
    let server = food_server().await;

    // users are only listable and readable
    let response = server.post("/users").json(&json!({"email": "new@example.com"})).await;

    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = response.json();
    assert_eq!(body["status"], 405);
    assert_eq!(body["title"], "Access to POST not supported");
}

#[tokio::test]
async fn test_put_is_not_supported() {
    let server = food_server().await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .put(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Chard"}))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["title"], "PUT is not supported.");
}

#[tokio::test]
async fn test_soft_delete_keeps_document_but_hides_it() {
    let note = ModelSchema::new("Note")
        .field("text", FieldSchema::string())
        .field("ownerId", FieldSchema::object_id("User"))
        .field("deleted", FieldSchema::boolean());
    let config = ResourceConfig::new().permissions(Permissions::all(vec![Permission::IsAny]));
    let store = seeded_store().await;
    let app = builder(store.clone())
        .register_resource("/notes", note, config)
        .unwrap()
        .build()
        .unwrap();
    let server = axum_test::TestServer::new(app).unwrap();

    let created: Value = server.post("/notes").json(&json!({"text": "hi"})).await.json();
    let id = created["data"]["_id"].as_str().unwrap().to_string();

    server
        .delete(&format!("/notes/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let response = server.get(&format!("/notes/{id}")).await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["meta"]["deleted"], true);

    let listed: Value = server.get("/notes").await.json();
    assert_eq!(listed["data"], json!([]));

    let stored = store.get("Note", &id).await.unwrap().unwrap();
    assert_eq!(stored["deleted"], true);
}

#[tokio::test]
async fn test_response_handler_reshapes_output() {
    let config = food_config().response_handler(|args| async move {
        Ok(match args.operation {
            Operation::List => json!({"count": args.data.as_array().map_or(0, Vec::len)}),
            _ => args.data,
        })
    });
    let server = food_server_with(config).await;
    create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let body: Value = server.get("/food").await.json();

    assert_eq!(body["data"], json!({"count": 1}));
    assert!(body.get("more").is_none());
}

#[tokio::test]
async fn test_failing_requester_provider_is_401() {
    let server = food_server().await;

    let response = server.get("/food").add_header("x-requester-id", " ").await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["title"], "Authentication failed");
}

#[tokio::test]
async fn test_health_routes() {
    let server = food_server().await;

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "ok");
    server.get("/healthz").await.assert_status_ok();
}

#[tokio::test]
async fn test_custom_routes_take_static_segments() {
    let stats = Router::new().route("/stats", get(|| async { Json(json!({"served": "custom"})) }));
    let server = food_server_with(food_config().custom_routes(stats)).await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let body: Value = server.get("/food/stats").await.json();
    assert_eq!(body["served"], "custom");

    server.get(&format!("/food/{id}")).await.assert_status_ok();
}

#[tokio::test]
async fn test_custom_route_replaces_generated_verb() {
    let read = Router::new().route(
        "/{id}",
        get(|Path(id): Path<String>| async move { Json(json!({"custom": id})) }),
    );
    let server = food_server_with(food_config().custom_routes(read)).await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let body: Value = server.get(&format!("/food/{id}")).await.json();
    assert_eq!(body, json!({"custom": id}));

    // verbs the custom route leaves alone still reach the generated ones
    let response = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Curly Kale"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["name"], "Curly Kale");

    let listed: Value = server.get("/food").await.json();
    assert_eq!(listed["data"][0]["name"], "Curly Kale");
    server
        .put(&format!("/food/{id}"))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_server_custom_routes_take_precedence() {
    let health =
        Router::new().route("/health", get(|| async { Json(json!({"status": "custom"})) }));
    let app = builder(seeded_store().await)
        .register_resource("/food", food_model(), food_config())
        .unwrap()
        .with_custom_routes(health)
        .build()
        .unwrap();
    let server = axum_test::TestServer::new(app).unwrap();

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "custom");
    let body: Value = server.get("/healthz").await.json();
    assert_eq!(body["status"], "ok");
    server.get("/food").await.assert_status_ok();
}

#[tokio::test]
async fn test_pre_hook_without_body_is_403() {
    let config = food_config().hooks(
        Hooks::new().pre_update(|_args| async move { Ok::<_, anyhow::Error>(None) }),
    );
    let server = food_server_with(config).await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Curly Kale"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["title"], "Update not allowed");
    assert_eq!(body["detail"], "A body must be returned from preUpdate");
}

#[tokio::test]
async fn test_pre_hook_error_is_400_and_nothing_is_written() {
    let config = food_config().hooks(Hooks::new().pre_create(|_args| async move {
        Err::<Option<Value>, _>(anyhow::anyhow!("quota exceeded"))
    }));
    let server = food_server_with(config).await;

    let response = server
        .post("/food")
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Kale", "ownerId": OWNER}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["title"], "preCreate hook error");
    assert_eq!(body["detail"], "quota exceeded");

    let listed: Value = server.get("/food").await.json();
    assert_eq!(listed["data"], json!([]));
}

#[tokio::test]
async fn test_pre_hook_api_error_keeps_its_status() {
    let config = food_config().hooks(Hooks::new().pre_delete(|_args| async move {
        Err::<Option<Value>, _>(anyhow::Error::new(
            ApiError::new(StatusCode::CONFLICT, "Food is part of a meal plan").without_tracking(),
        ))
    }));
    let server = food_server_with(config).await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .delete(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["title"], "Food is part of a meal plan");
    assert!(body.get("detail").is_none());
    server.get(&format!("/food/{id}")).await.assert_status_ok();
}

#[tokio::test]
async fn test_post_hook_error_is_400_after_commit() {
    let config = food_config().hooks(Hooks::new().post_update(|_args| async move {
        Err::<(), _>(anyhow::anyhow!("audit log unavailable"))
    }));
    let server = food_server_with(config).await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .patch(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Curly Kale"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["title"], "postUpdate hook error");
    assert_eq!(body["detail"], "audit log unavailable");

    // the update is not rolled back
    let read: Value = server.get(&format!("/food/{id}")).await.json();
    assert_eq!(read["data"]["name"], "Curly Kale");
}

#[tokio::test]
async fn test_post_delete_error_leaves_document_deleted() {
    let config = food_config().hooks(Hooks::new().post_delete(|_args| async move {
        Err::<(), _>(anyhow::anyhow!("cache purge failed"))
    }));
    let server = food_server_with(config).await;
    let id = create_food(&server, OWNER, json!({"name": "Kale", "ownerId": OWNER})).await;

    let response = server
        .delete(&format!("/food/{id}"))
        .add_header("x-requester-id", OWNER)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["title"], "postDelete hook error");
    server
        .get(&format!("/food/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_hook_api_error_keeps_its_status() {
    let config = food_config().hooks(Hooks::new().post_create(|args| async move {
        let name = args.result["name"].as_str().unwrap_or_default().to_string();
        Err::<(), _>(anyhow::Error::new(
            ApiError::new(StatusCode::CONFLICT, format!("{name} already logged today"))
                .without_tracking(),
        ))
    }));
    let server = food_server_with(config).await;

    let response = server
        .post("/food")
        .add_header("x-requester-id", OWNER)
        .json(&json!({"name": "Kale", "ownerId": OWNER}))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["title"], "Kale already logged today");

    let listed: Value = server.get("/food").await.json();
    assert_eq!(listed["data"][0]["name"], "Kale");
}
