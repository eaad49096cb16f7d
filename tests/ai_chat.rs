mod support;

use serde_json::{Value, json};

async fn post_ai_chat(body: Value) -> reqwest::Response {
    let base_url = support::ensure_server();
    reqwest::Client::new()
        .post(format!("{base_url}/api/ai/chat"))
        .json(&body)
        .send()
        .await
        .expect("request should succeed")
}

#[tokio::test]
async fn assistant_is_closed_outside_round_two() {
    let code = support::create_room(json!({})).await;
    let (mut ws, player_id) = support::join(&code, "Ada").await;
    let state = support::expect_message(&mut ws, "state", |s| {
        s["players"].as_array().is_some_and(|p| !p.is_empty())
    })
    .await;
    let team_id = state["teams"][0]["id"].as_str().expect("team id");

    let res = post_ai_chat(json!({
        "text": "build a wall at A1",
        "roomCode": code,
        "teamId": team_id,
        "playerId": player_id,
    }))
    .await;
    assert_eq!(res.status(), reqwest::StatusCode::CONFLICT);
    let body: Value = res.json().await.expect("error body");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn unknown_room_is_not_found() {
    let res = post_ai_chat(json!({
        "text": "hello",
        "roomCode": "QQQQ",
        "teamId": "team-1",
        "playerId": "nobody",
    }))
    .await;
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let res = post_ai_chat(json!({ "text": "hello" })).await;
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn strangers_cannot_use_a_team_assistant() {
    let code = support::create_room(json!({})).await;
    let (mut ws, _player_id) = support::join(&code, "Ada").await;
    let state = support::expect_message(&mut ws, "state", |s| {
        s["players"].as_array().is_some_and(|p| !p.is_empty())
    })
    .await;
    let team_id = state["teams"][0]["id"].as_str().expect("team id");

    let res = post_ai_chat(json!({
        "text": "hello",
        "roomCode": code,
        "teamId": team_id,
        "playerId": "not-a-player",
    }))
    .await;
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
}
