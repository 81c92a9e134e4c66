//! Fehler-Abbildung an der Dispatch-Grenze
//!
//! Handler geben `anyhow::Result` zurueck. Erkannte Fehlerarten
//! (`KollabError`, `ProtokollFehler`, ein direkt zurueckgegebenes
//! `ErrorPayload` mit eigenem Code) werden irgendwo in der Fehlerkette
//! gesucht und auf ihr stabiles `{code, message}` abgebildet. Alles andere
//! ist ein interner Fehler und wird ohne Details nach aussen gegeben.

use kollab_core::KollabError;

use crate::envelope::ErrorPayload;
use crate::error::ProtokollFehler;

/// Bildet einen Handler-Fehler auf ein stabiles Fehlerpaar ab
pub fn fehler_abbilden(fehler: &anyhow::Error) -> ErrorPayload {
    for ursache in fehler.chain() {
        if let Some(k) = ursache.downcast_ref::<KollabError>() {
            // Interne Details bleiben im Log
            if matches!(k, KollabError::Intern(_)) {
                return ErrorPayload::intern();
            }
            return ErrorPayload::from(k);
        }
        if let Some(p) = ursache.downcast_ref::<ProtokollFehler>() {
            if matches!(p, ProtokollFehler::Serialisierung(_)) {
                return ErrorPayload::intern();
            }
            return ErrorPayload::neu(p.code(), p.to_string());
        }
        if let Some(payload) = ursache.downcast_ref::<ErrorPayload>() {
            return payload.clone();
        }
    }
    ErrorPayload::intern()
}
