use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use forgestudy_backend::services::billing::sign_webhook_payload;

mod common;

use common::{TestApp, PASSWORD};

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = app.send(Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/nonexistent/path", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_protected_routes_reject_without_session_and_write_nothing() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(Method::POST, "/api/profiles", None, Some(json!({ "displayName": "Ava" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/documents",
            Some("not-a-real-token"),
            Some(json!({ "filename": "notes.txt", "content": "hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/api/cta?profileId=x", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.count("student_profiles").await, 0);
    assert_eq!(app.count("documents").await, 0);
}

#[tokio::test]
async fn test_register_login_me_logout() {
    let app = TestApp::new().await;
    let (_, token) = app.register("parent@example.com").await;

    let (status, body) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "parent@example.com");
    assert_eq!(body["data"]["planType"], "free");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "parent@example.com", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "parent@example.com", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let login = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "PARENT@example.com", "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    let (status, headers, body) = app.dispatch_full(login).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::SET_COOKIE).is_some());
    let second_token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(Method::POST, "/api/auth/logout", Some(&second_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/auth/me", &second_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_validates_fields() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "kid@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_accounts_profile_is_forbidden() {
    let app = TestApp::new().await;
    let (_, owner) = app.register("owner@example.com").await;
    let (_, intruder) = app.register("intruder@example.com").await;
    let profile_id = app.create_profile(&owner, "Ava").await;

    let (status, _) = app.get(&format!("/api/profiles/{profile_id}"), &intruder).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/api/topics",
            &intruder,
            json!({ "profileId": profile_id, "title": "Fractions" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.count("study_topics").await, 0);

    let (status, _) = app.get("/api/profiles/does-not-exist", &owner).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get("/api/topics", &owner).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "profileId is required");
}

#[tokio::test]
async fn test_airlock_release_and_review_flow() {
    let app = TestApp::new().await;
    let (_, token) = app.register("flow@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    let (status, body) = app
        .post(
            "/api/topics",
            &token,
            json!({ "profileId": profile_id, "title": "Photosynthesis" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["orbitState"], 0);
    let topic_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(&format!("/api/topics/{topic_id}/review"), &token, json!({ "score": 90 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(&format!("/api/topics/{topic_id}/release"), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["topic"]["orbitState"], 1);
    assert_eq!(body["data"]["alreadyActive"], false);
    assert_eq!(body["data"]["displayDelayMs"], 600);

    let (status, body) = app
        .post(&format!("/api/topics/{topic_id}/release"), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["alreadyActive"], true);

    let (status, _) = app
        .post(&format!("/api/topics/{topic_id}/review"), &token, json!({ "score": 140 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Mastery blends 40% of each score in: 40, 64, 78.4, then 87 crosses 80.
    for expected_mastery in [40.0, 64.0, 78.4] {
        let (status, body) = app
            .post(&format!("/api/topics/{topic_id}/review"), &token, json!({ "score": 100 }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["topic"]["orbitState"], 1);
        assert_eq!(body["data"]["topic"]["masteryScore"], expected_mastery);
    }

    let (status, body) = app
        .post(&format!("/api/topics/{topic_id}/review"), &token, json!({ "score": 100 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["previousState"], 1);
    assert_eq!(body["data"]["topic"]["orbitState"], 2);
    assert!(body["data"]["topic"]["nextReviewDate"].is_string());

    let (status, _) = app
        .post(&format!("/api/topics/{topic_id}/release"), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .get(&format!("/api/proof-events?profileId={profile_id}"), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["kind"], "review");
    assert_eq!(events[0]["topicId"], topic_id.as_str());
}

#[tokio::test]
async fn test_document_toggle_only_touches_callers_chunks() {
    let app = TestApp::new().await;
    let (_, alice) = app.register("alice@example.com").await;
    let (_, bob) = app.register("bob@example.com").await;

    let text = format!(
        "{}\n\n{}\n\n{}",
        "a".repeat(700),
        "b".repeat(700),
        "c".repeat(700)
    );
    for token in [&alice, &bob] {
        let (status, body) = app
            .post(
                "/api/documents",
                token,
                json!({ "filename": "chapter-1.txt", "content": text }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["chunks"].as_array().unwrap().len(), 3);
    }

    let (status, body) = app
        .post(
            "/api/documents/active",
            &alice,
            json!({ "filename": "chapter-1.txt", "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["updated"], 3);
    assert_eq!(body["data"]["failed"], 0);

    let (_, body) = app.get("/api/documents", &alice).await;
    assert_eq!(body["data"][0]["chunkCount"], 3);
    assert_eq!(body["data"][0]["activeChunks"], 0);

    let (_, body) = app.get("/api/documents", &bob).await;
    assert_eq!(body["data"][0]["chunkCount"], 3);
    assert_eq!(body["data"][0]["activeChunks"], 3);

    let (status, _) = app
        .post(
            "/api/documents/active",
            &alice,
            json!({ "filename": "missing.txt", "active": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_with_profile_quarantines_a_topic() {
    let app = TestApp::new().await;
    let (_, token) = app.register("upload@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    let (status, body) = app
        .post(
            "/api/documents",
            &token,
            json!({
                "filename": "unit-3_fractions.pdf",
                "content": "Fractions name parts of a whole.",
                "profileId": profile_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["topic"]["orbitState"], 0);
    assert_eq!(body["data"]["topic"]["source"], "upload");

    let (_, body) = app
        .get(&format!("/api/cta?profileId={profile_id}"), &token)
        .await;
    assert_eq!(body["data"]["reason"], "quarantine");
}

#[tokio::test]
async fn test_reupload_replaces_chunks_and_keeps_one_topic() {
    let app = TestApp::new().await;
    let (_, token) = app.register("reupload@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    let (status, body) = app
        .post(
            "/api/documents",
            &token,
            json!({
                "filename": "notes.txt",
                "content": "first version",
                "profileId": profile_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["replacedChunks"], 0);
    assert!(body["data"]["topic"].is_object());

    let (status, body) = app
        .post(
            "/api/documents",
            &token,
            json!({
                "filename": "notes.txt",
                "content": "second version",
                "profileId": profile_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["replacedChunks"], 1);
    assert!(body["data"]["topic"].is_null());

    let (status, body) = app.get("/api/documents/notes.txt/chunks", &token).await;
    assert_eq!(status, StatusCode::OK);
    let chunks = body["data"].as_array().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0]["chunkIndex"], 0);
    assert_eq!(chunks[0]["content"], "second version");

    assert_eq!(app.count("study_topics").await, 1);
}

#[tokio::test]
async fn test_emails_with_same_subject_stay_separate() {
    let app = TestApp::new().await;
    let (_, token) = app.register("mailbox@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    for body in ["because\n\nfriend", "which\n\nwhere"] {
        let payload = json!({ "profileId": profile_id, "subject": "Spelling list", "body": body })
            .to_string()
            .into_bytes();
        let (status, response) = app
            .send_raw(
                "/api/intake/email",
                &[("x-intake-secret", "intake-test-secret".to_string())],
                payload,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response["data"]["replacedChunks"], 0);
        assert_eq!(response["data"]["topic"]["title"], "Spelling list");
    }

    let (_, body) = app.get("/api/documents", &token).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(app.count("study_topics").await, 2);
}

#[tokio::test]
async fn test_email_intake_requires_shared_secret() {
    let app = TestApp::new().await;
    let (_, token) = app.register("intake@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;
    let payload = json!({
        "profileId": profile_id,
        "subject": "Spelling list week 4",
        "body": "because\n\nfriend\n\nwhich",
    })
    .to_string()
    .into_bytes();

    let (status, _) = app
        .send_raw(
            "/api/intake/email",
            &[("x-intake-secret", "wrong".to_string())],
            payload.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.count("documents").await, 0);

    let (status, body) = app
        .send_raw(
            "/api/intake/email",
            &[("x-intake-secret", "intake-test-secret".to_string())],
            payload,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["topic"]["source"], "email");

    let (_, body) = app
        .get(&format!("/api/topics?profileId={profile_id}&orbitState=0"), &token)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_exercise_attempt_scores_and_logs_proof() {
    let app = TestApp::new().await;
    let (_, token) = app.register("speller@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    let (status, body) = app
        .post(
            "/api/exercises",
            &token,
            json!({
                "profileId": profile_id,
                "kind": "spelling",
                "title": "Week 4",
                "items": [
                    { "prompt": "a close companion", "answer": "friend" },
                    { "prompt": "for the reason that", "answer": "because" },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let exercise_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            &format!("/api/exercises/{exercise_id}/attempts"),
            &token,
            json!({ "answers": [" Friend ", "becuase"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["correct"], 1);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["score"], 50.0);

    let (_, body) = app
        .get(&format!("/api/proof-events?profileId={profile_id}"), &token)
        .await;
    assert_eq!(body["data"][0]["kind"], "exercise_attempt");

    let (status, _) = app
        .post(
            "/api/exercises",
            &token,
            json!({ "profileId": profile_id, "kind": "spelling", "title": "Empty", "items": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_artifacts_need_a_known_kind_and_a_configured_model() {
    let app = TestApp::new().await;
    let (_, token) = app.register("artifacts@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    let (status, _) = app
        .get(&format!("/api/artifacts/flashcards?profileId={profile_id}"), &token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .get(&format!("/api/artifacts/exam-sheets?profileId={profile_id}"), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = app
        .post(
            "/api/artifacts/practice-ladders",
            &token,
            json!({ "profileId": profile_id, "title": "Long division" }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.count("practice_sets").await, 0);
}

#[tokio::test]
async fn test_homework_crud_and_deadline_cta() {
    let app = TestApp::new().await;
    let (_, token) = app.register("homework@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;
    let due = forgestudy_backend::time::now_ms() + 3_600_000;

    let (status, body) = app
        .post(
            "/api/homework",
            &token,
            json!({
                "profileId": profile_id,
                "title": "Maths worksheet",
                "dueAt": due.to_string(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = app
        .get(&format!("/api/cta?profileId={profile_id}"), &token)
        .await;
    assert_eq!(body["data"]["reason"], "deadline");
    assert_eq!(body["data"]["taskId"], task_id.as_str());

    let (status, body) = app
        .post(&format!("/api/homework/{task_id}/complete"), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");

    let (_, body) = app
        .get(&format!("/api/cta?profileId={profile_id}"), &token)
        .await;
    assert_eq!(body["data"]["reason"], "default");
    assert_eq!(body["data"]["label"], "Start Studying");

    let (status, _) = app
        .post(
            "/api/homework",
            &token,
            json!({ "profileId": profile_id, "title": "No date", "dueAt": "next tuesday" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_billing_webhook_checks_signature_and_syncs_plan() {
    let app = TestApp::new().await;
    let (user_id, token) = app.register("billing@example.com").await;

    let (_, body) = app.get("/api/billing/status", &token).await;
    assert_eq!(body["data"]["planType"], "free");
    assert_eq!(body["data"]["isPaid"], false);

    let payload = json!({
        "type": "customer.subscription.updated",
        "data": { "object": {
            "id": "sub_123",
            "customer": "cus_123",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_end": 1_900_000_000,
            "items": { "data": [ { "price": { "id": "price_monthly_test" } } ] },
            "metadata": { "user_id": user_id },
        } },
    })
    .to_string()
    .into_bytes();

    let now_secs = chrono::Utc::now().timestamp();
    let (status, _) = app
        .send_raw(
            "/api/billing/webhook",
            &[("stripe-signature", sign_webhook_payload(&payload, "whsec_wrong", now_secs))],
            payload.clone(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send_raw(
            "/api/billing/webhook",
            &[("stripe-signature", sign_webhook_payload(&payload, "whsec_test", now_secs))],
            payload,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["handled"], true);

    let (_, body) = app.get("/api/billing/status", &token).await;
    assert_eq!(body["data"]["planType"], "monthly");
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["customerId"], "cus_123");
    assert_eq!(body["data"]["isPaid"], true);

    let (_, body) = app.get("/api/auth/me", &token).await;
    assert_eq!(body["data"]["planType"], "monthly");
}

#[tokio::test]
async fn test_chat_topics_and_tutor_without_model() {
    let app = TestApp::new().await;
    let (_, token) = app.register("chat@example.com").await;
    let profile_id = app.create_profile(&token, "Ava").await;

    let (status, body) = app
        .post("/api/chats", &token, json!({ "title": "Volcanoes", "profileId": profile_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let chat_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(
            &format!("/api/chats/{chat_id}/messages"),
            &token,
            json!({ "content": "Why do volcanoes erupt?" }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.count("messages").await, 0);

    let (status, body) = app
        .post(
            &format!("/api/chats/{chat_id}/topics"),
            &token,
            json!({ "title": "Plate tectonics" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["source"], "chat");
    assert_eq!(body["data"]["orbitState"], 0);
}
