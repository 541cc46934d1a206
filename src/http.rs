//! HTTP boundary
//!
//! Two surfaces share one router: the MCP bridge endpoints the game mod
//! already speaks (`/mcp/call`, `/mcp/health`), and the service routes that
//! expose NPC features directly. Bridge-level failures are payloads with
//! HTTP 200; handler faults map through [`crate::Error`].

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::dialogue::sanitize_npc_response;
use crate::npc::challenges::BuildData;
use crate::npc::Location;
use crate::state::AppState;
use crate::{Error, Result};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp/call", post(mcp_call))
        .route("/mcp/health", get(mcp_health))
        .route("/npc/talk", post(npc_talk))
        .route("/npc/list", get(npc_list))
        .route("/npc/create", post(npc_create))
        .route("/dialogue/options", post(dialogue_options))
        .route("/dialogue/select", post(dialogue_select))
        .route("/dialogue/start", post(dialogue_start))
        .route("/dialogue/respond", post(dialogue_respond))
        .route("/quest/request", post(quest_request))
        .route("/quest/accept", post(quest_accept))
        .route("/quest/status/{player}", get(quest_status))
        .route("/quest/check", post(quest_check))
        .route("/challenge/list", get(challenge_list))
        .route("/challenge/request", post(challenge_request))
        .route("/challenge/validate", post(challenge_validate))
        .route("/milestones/check", post(milestones_check))
        .route("/milestones/{player}", get(milestones_list))
        .route("/lore/progress/{player}", get(lore_progress))
        .route("/lore/discover", post(lore_discover))
        .route("/lore/random", get(lore_random))
        .route("/party/create", post(party_create))
        .route("/party/invite", post(party_invite))
        .route("/party/leave", post(party_leave))
        .route("/party/chat", post(party_chat))
        .route("/party/discuss", post(party_discuss))
        .route("/party/status/{player}", get(party_status))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// MCP bridge

#[derive(Debug, Deserialize)]
struct McpCallRequest {
    tool: String,
    #[serde(default)]
    arguments: JsonValue,
}

/// Forward a tool call to the child MCP server. The bridge reports its own
/// failures as `{"error": ...}` payloads, so this always answers 200.
async fn mcp_call(State(state): State<AppState>, Json(req): Json<McpCallRequest>) -> Json<JsonValue> {
    let arguments = if req.arguments.is_null() {
        json!({})
    } else {
        req.arguments
    };
    let timeout = Duration::from_secs(state.config.mcp_call_timeout_secs);
    Json(state.bridge.call(&req.tool, arguments, timeout).await)
}

async fn mcp_health(State(state): State<AppState>) -> Json<JsonValue> {
    let status = state.bridge.status();
    Json(json!({
        "status": if status.alive { "ok" } else { "down" },
        "initialized": status.initialized,
    }))
}

// ---------------------------------------------------------------------------
// NPCs

#[derive(Debug, Deserialize)]
struct TalkRequest {
    npc_id: String,
    player: String,
    message: String,
    #[serde(default)]
    nearby_entities: Vec<JsonValue>,
}

async fn npc_talk(
    State(state): State<AppState>,
    Json(req): Json<TalkRequest>,
) -> Result<Json<JsonValue>> {
    let mut npcs = state.npcs.write().await;
    let npc_name = npcs.get(&req.npc_id)?.name.clone();
    let context = npcs.player_context(&req.player, req.nearby_entities);
    let response = npcs
        .generate_response(&state.router, &req.npc_id, &req.player, &req.message, Some(context))
        .await?;

    Ok(Json(json!({
        "npc_id": req.npc_id,
        "npc_name": npc_name,
        "player": req.player,
        "response": sanitize_npc_response(&response),
    })))
}

async fn npc_list(State(state): State<AppState>) -> Json<JsonValue> {
    let npcs = state.npcs.read().await;
    let list: Vec<JsonValue> = npcs
        .list()
        .into_iter()
        .map(|npc| {
            json!({
                "id": npc.id,
                "name": npc.name,
                "personality": npc.personality,
                "interests": npc.interests,
                "location": npc.location,
                "is_dynamic": npc.is_dynamic,
            })
        })
        .collect();
    Json(json!({ "npcs": list, "count": list.len() }))
}

#[derive(Debug, Deserialize)]
struct CreateNpcRequest {
    template_id: String,
    #[serde(default)]
    location: Location,
    #[serde(default)]
    name: Option<String>,
}

async fn npc_create(
    State(state): State<AppState>,
    Json(req): Json<CreateNpcRequest>,
) -> Result<Json<crate::npc::Npc>> {
    let mut npcs = state.npcs.write().await;
    let npc = npcs
        .create_npc(&state.router, &req.template_id, req.location, req.name.as_deref())
        .await?;
    Ok(Json(npc))
}

// ---------------------------------------------------------------------------
// Dialogue

#[derive(Debug, Deserialize)]
struct DialogueOptionsRequest {
    npc_id: String,
    player: String,
    #[serde(default = "default_context_type")]
    context_type: String,
}

fn default_context_type() -> String {
    "greeting".to_string()
}

async fn dialogue_options(
    State(state): State<AppState>,
    Json(req): Json<DialogueOptionsRequest>,
) -> Result<Json<crate::dialogue::DialogueSet>> {
    let npcs = state.npcs.read().await;
    let quests = state.quests.read().await;
    let lore = state.lore.read().await;
    let mut dialogue = state.dialogue.write().await;
    let set = dialogue
        .generate_options(
            &state.router,
            &npcs,
            &quests,
            &lore,
            &req.npc_id,
            &req.player,
            &req.context_type,
        )
        .await?;
    Ok(Json(set))
}

#[derive(Debug, Deserialize)]
struct DialogueSelectRequest {
    npc_id: String,
    player: String,
    option_id: u32,
    option_text: String,
    #[serde(default)]
    relationship_delta: i32,
    #[serde(default)]
    nearby_entities: Vec<JsonValue>,
}

async fn dialogue_select(
    State(state): State<AppState>,
    Json(req): Json<DialogueSelectRequest>,
) -> Result<Json<crate::dialogue::SelectionResult>> {
    let mut npcs = state.npcs.write().await;
    let mut dialogue = state.dialogue.write().await;
    let result = dialogue
        .select_option(
            &state.router,
            &mut npcs,
            &req.npc_id,
            &req.player,
            req.option_id,
            &req.option_text,
            req.relationship_delta,
            req.nearby_entities,
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct DialogueStartRequest {
    npc_id: String,
    player: String,
}

async fn dialogue_start(
    State(state): State<AppState>,
    Json(req): Json<DialogueStartRequest>,
) -> Result<Json<crate::dialogue::DialogueSet>> {
    let npcs = state.npcs.read().await;
    let quests = state.quests.read().await;
    let lore = state.lore.read().await;
    let mut dialogue = state.dialogue.write().await;
    let set = dialogue
        .start_dialogue(&state.router, &npcs, &quests, &lore, &req.npc_id, &req.player)
        .await?;
    Ok(Json(set))
}

#[derive(Debug, Deserialize)]
struct DialogueRespondRequest {
    conversation_id: String,
    npc_id: String,
    player: String,
    option_text: String,
}

async fn dialogue_respond(
    State(state): State<AppState>,
    Json(req): Json<DialogueRespondRequest>,
) -> Result<Json<crate::dialogue::DialogueTurn>> {
    let mut npcs = state.npcs.write().await;
    let quests = state.quests.read().await;
    let lore = state.lore.read().await;
    let mut dialogue = state.dialogue.write().await;
    let turn = dialogue
        .respond(
            &state.router,
            &mut npcs,
            &quests,
            &lore,
            &req.conversation_id,
            &req.npc_id,
            &req.player,
            &req.option_text,
        )
        .await?;
    Ok(Json(turn))
}

// ---------------------------------------------------------------------------
// Quests

#[derive(Debug, Deserialize)]
struct QuestRequest {
    npc_id: String,
    player: String,
    #[serde(default)]
    quest_type: Option<String>,
}

async fn quest_request(
    State(state): State<AppState>,
    Json(req): Json<QuestRequest>,
) -> Result<Json<crate::npc::quests::Quest>> {
    let npcs = state.npcs.read().await;
    let npc = npcs.get(&req.npc_id)?.clone();
    let context = npcs.player_context(&req.player, Vec::new());
    drop(npcs);

    let mut quests = state.quests.write().await;
    let quest = quests
        .generate_quest(&state.router, &npc, &req.player, req.quest_type.as_deref(), &context)
        .await?;
    Ok(Json(quest))
}

#[derive(Debug, Deserialize)]
struct QuestAcceptRequest {
    player: String,
    quest_id: String,
}

async fn quest_accept(
    State(state): State<AppState>,
    Json(req): Json<QuestAcceptRequest>,
) -> Json<crate::npc::quests::AcceptResult> {
    let mut quests = state.quests.write().await;
    Json(quests.accept(&req.player, &req.quest_id))
}

async fn quest_status(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> Json<crate::npc::quests::QuestStatus> {
    let quests = state.quests.read().await;
    Json(quests.status(&player))
}

#[derive(Debug, Deserialize)]
struct QuestCheckRequest {
    player: String,
}

async fn quest_check(
    State(state): State<AppState>,
    Json(req): Json<QuestCheckRequest>,
) -> Json<crate::npc::quests::ProgressReport> {
    let npcs = state.npcs.read().await;
    let mut quests = state.quests.write().await;
    let report = quests
        .check_progress(&req.player, npcs.npcs(), &state.game)
        .await;
    Json(report)
}

// ---------------------------------------------------------------------------
// Build challenges

async fn challenge_list(State(state): State<AppState>) -> Json<JsonValue> {
    let npcs = state.npcs.read().await;
    let templates = npcs.challenge_templates();
    Json(json!({ "challenges": templates, "count": templates.len() }))
}

#[derive(Debug, Deserialize)]
struct ChallengeRequest {
    npc_id: String,
    player: String,
    #[serde(default)]
    challenge_id: Option<String>,
}

async fn challenge_request(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<crate::npc::quests::Quest>> {
    let npcs = state.npcs.read().await;
    let npc = npcs.get(&req.npc_id)?.clone();
    let templates = npcs.challenge_templates().to_vec();
    drop(npcs);

    let mut quests = state.quests.write().await;
    let quest = quests.generate_challenge_quest(
        &npc,
        &templates,
        &req.player,
        req.challenge_id.as_deref(),
    )?;
    Ok(Json(quest))
}

#[derive(Debug, Deserialize)]
struct ChallengeValidateRequest {
    player: String,
    quest_id: String,
    #[serde(default)]
    build: BuildData,
}

async fn challenge_validate(
    State(state): State<AppState>,
    Json(req): Json<ChallengeValidateRequest>,
) -> Result<Json<crate::npc::challenges::ValidationReport>> {
    let quests = state.quests.read().await;
    let report = quests.validate_challenge(&req.player, &req.quest_id, &req.build)?;
    Ok(Json(report))
}

// ---------------------------------------------------------------------------
// Milestones

#[derive(Debug, Deserialize)]
struct MilestoneCheckRequest {
    player: String,
}

async fn milestones_check(
    State(state): State<AppState>,
    Json(req): Json<MilestoneCheckRequest>,
) -> Json<crate::milestones::MilestoneCheck> {
    let mut milestones = state.milestones.write().await;
    Json(milestones.check(&req.player))
}

async fn milestones_list(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> Json<crate::milestones::AchievementList> {
    let milestones = state.milestones.read().await;
    Json(milestones.list(&player))
}

// ---------------------------------------------------------------------------
// Lore

async fn lore_progress(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> Json<crate::lore::LoreProgress> {
    let lore = state.lore.read().await;
    Json(lore.player_progress(&player))
}

#[derive(Debug, Deserialize)]
struct LoreDiscoverRequest {
    player: String,
    lore_id: String,
    #[serde(default)]
    content: Option<String>,
}

async fn lore_discover(
    State(state): State<AppState>,
    Json(req): Json<LoreDiscoverRequest>,
) -> Json<crate::lore::DiscoveryResult> {
    let mut lore = state.lore.write().await;
    Json(lore.mark_discovered(&req.player, &req.lore_id, req.content.as_deref()))
}

#[derive(Debug, Deserialize)]
struct LoreRandomQuery {
    #[serde(default)]
    player: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

async fn lore_random(
    State(state): State<AppState>,
    Query(query): Query<LoreRandomQuery>,
) -> Result<Json<crate::lore::BookView>> {
    let lore = state.lore.read().await;
    lore.random_book(query.player.as_deref(), query.category.as_deref())
        .map(Json)
        .ok_or_else(|| Error::Other("No lore books available".to_string()))
}

// ---------------------------------------------------------------------------
// Parties
//
// The party service reports player mistakes ("party is full", "no active
// party") as error payloads, not transport failures.

fn party_error(message: String) -> Json<JsonValue> {
    Json(json!({ "error": message }))
}

#[derive(Debug, Deserialize)]
struct PartyCreateRequest {
    player: String,
    #[serde(default)]
    name: Option<String>,
}

async fn party_create(
    State(state): State<AppState>,
    Json(req): Json<PartyCreateRequest>,
) -> Json<JsonValue> {
    let mut parties = state.parties.write().await;
    match parties.create(&req.player, req.name.as_deref()) {
        Ok(party) => Json(json!({
            "success": true,
            "message": format!("Created party: {}", party.name),
            "party": party,
        })),
        Err(message) => party_error(message),
    }
}

#[derive(Debug, Deserialize)]
struct PartyInviteRequest {
    player: String,
    npc_id: String,
}

async fn party_invite(
    State(state): State<AppState>,
    Json(req): Json<PartyInviteRequest>,
) -> Json<JsonValue> {
    let npcs = state.npcs.read().await;
    let mut parties = state.parties.write().await;
    match parties
        .invite(&state.router, &npcs, &req.player, &req.npc_id)
        .await
    {
        Ok(result) => Json(json!({ "success": true, "result": result })),
        Err(message) => party_error(message),
    }
}

#[derive(Debug, Deserialize)]
struct PartyLeaveRequest {
    player: String,
    #[serde(default)]
    npc_id: Option<String>,
}

async fn party_leave(
    State(state): State<AppState>,
    Json(req): Json<PartyLeaveRequest>,
) -> Json<JsonValue> {
    let npcs = state.npcs.read().await;
    let mut parties = state.parties.write().await;
    match parties.leave(&npcs, &req.player, req.npc_id.as_deref()) {
        Ok(message) => Json(json!({ "success": true, "message": message })),
        Err(message) => party_error(message),
    }
}

#[derive(Debug, Deserialize)]
struct PartyChatRequest {
    player: String,
    message: String,
}

async fn party_chat(
    State(state): State<AppState>,
    Json(req): Json<PartyChatRequest>,
) -> Json<JsonValue> {
    let npcs = state.npcs.read().await;
    let mut parties = state.parties.write().await;
    match parties
        .chat(&state.router, &npcs, &req.player, &req.message)
        .await
    {
        Ok(result) => Json(json!({ "success": true, "result": result })),
        Err(message) => party_error(message),
    }
}

#[derive(Debug, Deserialize)]
struct PartyDiscussRequest {
    player: String,
    topic: String,
}

async fn party_discuss(
    State(state): State<AppState>,
    Json(req): Json<PartyDiscussRequest>,
) -> Json<JsonValue> {
    let npcs = state.npcs.read().await;
    let parties = state.parties.read().await;
    match parties
        .discuss(&state.router, &npcs, &req.player, &req.topic)
        .await
    {
        Ok(result) => Json(json!({ "success": true, "result": result })),
        Err(message) => party_error(message),
    }
}

async fn party_status(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> Json<crate::party::PartyStatus> {
    let npcs = state.npcs.read().await;
    let parties = state.parties.read().await;
    Json(parties.status(&npcs, &player))
}
