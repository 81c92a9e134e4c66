//! Kollaborations-Handler
//!
//! | Eingang        | Ausgang                                   | Empfaenger                           |
//! |----------------|-------------------------------------------|--------------------------------------|
//! | `cursor:move`  | `cursor:moved {userId, ...payload}`       | Raum ohne den Absender               |
//! | `canvas:save`  | `canvas:saved` / `canvas:updated`         | Absender / Raum ohne Absender-Socket |
//! | `chat:message` | `chat:newMessage {userId, message, ts}`   | Raum ohne Absender-Socket            |
//! | `user:typing`  | `user:isTyping {userId, isTyping}`        | Raum ohne Absender-Socket            |
//!
//! `canvas:save` verlangt die Berechtigung `write` und antwortet sonst mit
//! einem Fehler-Broadcast an den Absender.

use kollab_core::KollabError;
use kollab_protocol::{zeitstempel_ms, BroadcastEvent};
use serde_json::{json, Map, Value};

use crate::context::EventContext;
use crate::processor::EventProcessor;

/// Berechtigung fuer schreibende Canvas-Operationen
pub const RECHT_SCHREIBEN: &str = "write";

/// Registriert alle Kollaborations-Handler am Processor
pub fn collab_handler_registrieren(processor: &EventProcessor) {
    processor.register_event_handler("cursor:move", cursor_move);
    processor.register_event_handler("canvas:save", canvas_save);
    processor.register_event_handler("chat:message", chat_message);
    processor.register_event_handler("user:typing", user_typing);
}

/// Fehler-Broadcast an den Absender des Events
fn fehler_an_absender(ctx: &EventContext, fehler: KollabError) -> BroadcastEvent {
    BroadcastEvent::fehler_code(ctx.socket_id.clone(), fehler.code(), fehler.to_string())
}

pub async fn cursor_move(
    ctx: EventContext,
    processor: EventProcessor,
) -> anyhow::Result<Option<BroadcastEvent>> {
    let Some(raum) = ctx.room_id.as_ref() else {
        tracing::debug!(user = %ctx.user_id, "cursor:move ohne Raum ignoriert");
        return Ok(None);
    };

    let empfaenger = processor
        .raum_empfaenger(raum, &[], std::slice::from_ref(&ctx.user_id))
        .await?;

    // userId des Absenders hat Vorrang vor einem gleichnamigen Payload-Feld
    let mut payload = match &ctx.event.payload {
        Value::Object(felder) => felder.clone(),
        _ => Map::new(),
    };
    payload.insert("userId".into(), json!(ctx.user_id));

    Ok(Some(BroadcastEvent::neu(
        "cursor:moved",
        empfaenger,
        Value::Object(payload),
    )))
}

pub async fn canvas_save(
    ctx: EventContext,
    processor: EventProcessor,
) -> anyhow::Result<Vec<BroadcastEvent>> {
    let raum = match ctx.raum() {
        Ok(r) => r.clone(),
        Err(e) => return Ok(vec![fehler_an_absender(&ctx, e)]),
    };

    if !processor
        .check_permission(&ctx.user_id, &raum, RECHT_SCHREIBEN)
        .await
    {
        tracing::info!(user = %ctx.user_id, raum = %raum, "canvas:save ohne Schreibrecht");
        return Ok(vec![fehler_an_absender(
            &ctx,
            KollabError::ZugriffVerweigert("Keine Schreibberechtigung fuer diesen Raum".into()),
        )]);
    }

    // Nur der Absender-Socket faellt weg, weitere Sockets desselben Benutzers nicht
    let andere = processor
        .raum_empfaenger(&raum, std::slice::from_ref(&ctx.socket_id), &[])
        .await?;

    Ok(vec![
        BroadcastEvent::neu(
            "canvas:saved",
            vec![ctx.socket_id.clone()],
            json!({ "success": true, "savedAt": zeitstempel_ms() }),
        ),
        BroadcastEvent::neu(
            "canvas:updated",
            andere,
            json!({ "userId": ctx.user_id, "data": ctx.event.payload }),
        ),
    ])
}

pub async fn chat_message(ctx: EventContext, processor: EventProcessor) -> anyhow::Result<()> {
    let Some(raum) = ctx.room_id.as_ref() else {
        tracing::debug!(user = %ctx.user_id, "chat:message ohne Raum ignoriert");
        return Ok(());
    };
    processor
        .broadcast_to_room(
            raum,
            "chat:newMessage",
            json!({
                "userId": ctx.user_id,
                "message": ctx.event.payload,
                "timestamp": zeitstempel_ms(),
            }),
            std::slice::from_ref(&ctx.socket_id),
        )
        .await?;
    Ok(())
}

pub async fn user_typing(ctx: EventContext, processor: EventProcessor) -> anyhow::Result<()> {
    let Some(raum) = ctx.room_id.as_ref() else {
        return Ok(());
    };
    processor
        .broadcast_to_room(
            raum,
            "user:isTyping",
            json!({ "userId": ctx.user_id, "isTyping": ctx.event.payload }),
            std::slice::from_ref(&ctx.socket_id),
        )
        .await?;
    Ok(())
}
