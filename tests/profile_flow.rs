//! Integration tests for profiles, badges and the notification inbox.

mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn profile_edits_award_autobiographer_once() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let admin = server.admin().await?;
    let ram = server.user(&admin, "ram").await?;

    let (status, edited) = ram
        .put_json(
            "/api/profile",
            json!({ "full_name": "Ram Shrestha", "about_me": "Third year computer engineering." }),
        )
        .await?;
    assert_eq!(status, 200, "{edited}");
    assert_eq!(edited["profile"]["full_name"], "Ram Shrestha");
    assert_eq!(edited["badges_awarded"], json!(["Autobiographer"]));

    let (_, edited) = ram
        .put_json("/api/profile", json!({ "about_me": "Fourth year now." }))
        .await?;
    assert_eq!(edited["badges_awarded"], json!([]));

    let id = ram.id().await?;
    let (_, summary) = ram.get(&format!("/api/users/{id}")).await?;
    assert_eq!(summary["badge_count"], 1);
    assert_eq!(summary["badges"][0]["name"], "Autobiographer");

    let (_, private) = ram.get("/api/notifications/private").await?;
    assert_eq!(private["notifications"].as_array().map(Vec::len), Some(1));
    let (_, counts) = ram.get("/api/notifications/counts").await?;
    assert_eq!(counts["private"], 1);
    let (_, read) = ram.post("/api/notifications/private/read-all").await?;
    assert_eq!(read["updated"], 1);
    let (_, counts) = ram.get("/api/notifications/counts").await?;
    assert_eq!(counts["total"], 0);
    Ok(())
}

#[tokio::test]
async fn email_changes_stay_within_college_domains() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let admin = server.admin().await?;
    let ram = server.user(&admin, "ram").await?;
    server.user(&admin, "sita").await?;

    let (status, _) = ram
        .put_json("/api/profile/email", json!({ "email": "ram@gmail.com" }))
        .await?;
    assert_eq!(status, 400);

    let (status, _) = ram
        .put_json("/api/profile/email", json!({ "email": "sita@khec.edu.np" }))
        .await?;
    assert_eq!(status, 409);

    let (status, _) = ram
        .put_json("/api/profile/email", json!({ "email": "Ram.S@khec.edu.np" }))
        .await?;
    assert_eq!(status, 200);
    let (_, me) = ram.get("/api/me").await?;
    assert_eq!(me["user"]["email"], "ram.s@khec.edu.np");
    Ok(())
}

#[tokio::test]
async fn user_search_and_notification_cleanup() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let admin = server.admin().await?;
    let ram = server.user(&admin, "ram").await?;
    let sita = server.user(&admin, "sita").await?;

    let (_, found) = ram.get("/api/users/search?q=sit").await?;
    assert_eq!(found["users"][0]["username"], "sita");
    let (_, empty) = ram.get("/api/users/search?q=").await?;
    assert_eq!(empty["users"], json!([]));

    let (_, question) = ram
        .post_json(
            "/api/questions",
            json!({ "title": "Library hours?", "body": "Is the library open on Saturdays?" }),
        )
        .await?;
    let qid = question["id"].as_i64().unwrap();
    sita.post_json(
        &format!("/api/questions/{qid}/answers"),
        json!({ "body": "Yes, from ten until four." }),
    )
    .await?;
    sita.post_json(
        &format!("/api/questions/{qid}/comments"),
        json!({ "body": "Bring your ID card." }),
    )
    .await?;

    let (_, inbox) = ram.get("/api/notifications").await?;
    let items = inbox["notifications"].as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 2);
    assert_eq!(inbox["unread"]["general"], 2);

    let first = items[0]["id"].as_i64().unwrap();
    let (status, _) = sita.delete(&format!("/api/notifications/{first}")).await?;
    assert_eq!(status, 404);
    let (status, _) = ram.delete(&format!("/api/notifications/{first}")).await?;
    assert_eq!(status, 200);

    let (_, cleared) = ram.delete("/api/notifications").await?;
    assert_eq!(cleared["deleted_count"], 1);
    Ok(())
}

#[tokio::test]
async fn profile_tabs_page_votes_reputation_and_actions() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let admin = server.admin().await?;
    let ram = server.user(&admin, "ram").await?;
    let sita = server.user(&admin, "sita").await?;
    let ram_id = ram.id().await?;
    let sita_id = sita.id().await?;

    let (status, question) = sita
        .post_json(
            "/api/questions",
            json!({
                "title": "Which sorting algorithm is stable?",
                "body": "Our data structures lab needs a stable sort.",
                "tags": ["algorithms"],
            }),
        )
        .await?;
    assert_eq!(status, 201, "{question}");
    let qid = question["id"].as_i64().unwrap();

    let (status, answer) = ram
        .post_json(
            &format!("/api/questions/{qid}/answers"),
            json!({ "body": "Merge sort is stable, quicksort usually is not." }),
        )
        .await?;
    assert_eq!(status, 201, "{answer}");
    let aid = answer["id"].as_i64().unwrap();

    ram.post_json(&format!("/api/questions/{qid}/vote"), json!({ "direction": "up" }))
        .await?;
    sita.post_json(&format!("/api/answers/{aid}/vote"), json!({ "direction": "up" }))
        .await?;

    let (status, votes) = ram.get(&format!("/api/users/{ram_id}/votes")).await?;
    assert_eq!(status, 200, "{votes}");
    assert_eq!(votes["votes"]["total"], 1);
    assert_eq!(votes["votes"]["items"][0]["kind"], "question");
    assert_eq!(votes["votes"]["items"][0]["question_id"], qid);

    let (_, reputation) = sita.get(&format!("/api/users/{ram_id}/reputation")).await?;
    assert_eq!(reputation["reputation"], 10);
    assert_eq!(reputation["events"]["items"][0]["reason"], "answer_upvoted");
    assert_eq!(reputation["events"]["num_pages"], 1);

    let (_, tags) = sita.get(&format!("/api/users/{ram_id}/tags")).await?;
    assert_eq!(tags["tags"][0]["tag"], "algorithms");
    assert_eq!(tags["tags"][0]["score"], 1);
    assert_eq!(tags["tags"][0]["tier"], serde_json::Value::Null);

    let (_, actions) = sita.get(&format!("/api/users/{sita_id}/actions")).await?;
    assert_eq!(actions["actions"]["total"], 1);
    assert_eq!(actions["actions"]["items"][0]["kind"], "question");
    assert_eq!(actions["actions"]["items"][0]["title"], "Which sorting algorithm is stable?");

    let (status, _) = ram.get("/api/users/9999/actions").await?;
    assert_eq!(status, 404);
    Ok(())
}

#[tokio::test]
async fn badge_holders_and_badge_target() -> anyhow::Result<()> {
    let server = TestServer::spawn().await?;
    let admin = server.admin().await?;
    let ram = server.user(&admin, "ram").await?;
    let ram_id = ram.id().await?;

    ram.put_json("/api/profile", json!({ "about_me": "Likes compilers." }))
        .await?;

    let (status, holders) = ram.get("/api/badges/Autobiographer/holders").await?;
    assert_eq!(status, 200, "{holders}");
    assert_eq!(holders["holder_count"], 1);
    assert_eq!(holders["holders"][0]["username"], "ram");
    assert_eq!(holders["badge"]["tier"], "Bronze");

    let (status, empty) = ram.get("/api/badges/Critic/holders").await?;
    assert_eq!(status, 200);
    assert_eq!(empty["holders"], json!([]));
    let (status, _) = ram.get("/api/badges/Astronaut/holders").await?;
    assert_eq!(status, 404);

    let (status, _) = ram
        .put_json("/api/profile/badge-target", json!({ "badge": "Astronaut" }))
        .await?;
    assert_eq!(status, 400);
    let (status, target) = ram
        .put_json("/api/profile/badge-target", json!({ "badge": "Civic Duty" }))
        .await?;
    assert_eq!(status, 200, "{target}");
    assert_eq!(target["targeted_badge"], "Civic Duty");

    let (_, summary) = ram.get(&format!("/api/users/{ram_id}")).await?;
    assert_eq!(summary["profile"]["targeted_badge"], "Civic Duty");
    assert_eq!(summary["next_badges"][0]["name"], "Civic Duty");

    let (_, badges) = ram.get(&format!("/api/users/{ram_id}/badges")).await?;
    assert_eq!(badges["badges"][0]["name"], "Autobiographer");
    assert_eq!(badges["targeted_badge"], "Civic Duty");
    Ok(())
}
