//! Handler-Typen des Event-Processors

use std::sync::Arc;

use futures_util::future::BoxFuture;
use kollab_protocol::BroadcastEvent;

use crate::context::EventContext;
use crate::processor::EventProcessor;

/// Rueckgabe eines Handlers: nichts, ein Event oder eine geordnete Folge
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HandlerErgebnis {
    #[default]
    Nichts,
    Einzeln(BroadcastEvent),
    Mehrere(Vec<BroadcastEvent>),
}

impl HandlerErgebnis {
    /// Events in Publikations-Reihenfolge
    pub fn into_events(self) -> Vec<BroadcastEvent> {
        match self {
            Self::Nichts => Vec::new(),
            Self::Einzeln(e) => vec![e],
            Self::Mehrere(v) => v,
        }
    }
}

impl From<()> for HandlerErgebnis {
    fn from(_: ()) -> Self {
        Self::Nichts
    }
}

impl From<BroadcastEvent> for HandlerErgebnis {
    fn from(e: BroadcastEvent) -> Self {
        Self::Einzeln(e)
    }
}

impl From<Option<BroadcastEvent>> for HandlerErgebnis {
    fn from(e: Option<BroadcastEvent>) -> Self {
        e.map_or(Self::Nichts, Self::Einzeln)
    }
}

impl From<Vec<BroadcastEvent>> for HandlerErgebnis {
    fn from(v: Vec<BroadcastEvent>) -> Self {
        Self::Mehrere(v)
    }
}

/// Gespeicherter Handler; der Processor wird beim Aufruf uebergeben
pub type ProcessorHandler = Arc<
    dyn Fn(EventContext, EventProcessor) -> BoxFuture<'static, anyhow::Result<HandlerErgebnis>>
        + Send
        + Sync,
>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn event(typ: &str) -> BroadcastEvent {
        BroadcastEvent::neu(typ, vec![], Value::Null)
    }

    #[test]
    fn umwandlungen() {
        assert!(HandlerErgebnis::from(()).into_events().is_empty());
        assert!(HandlerErgebnis::from(None::<BroadcastEvent>).into_events().is_empty());
        assert_eq!(HandlerErgebnis::from(event("a")).into_events().len(), 1);

        let reihenfolge: Vec<String> = HandlerErgebnis::from(vec![event("a"), event("b")])
            .into_events()
            .into_iter()
            .map(|e| e.typ)
            .collect();
        assert_eq!(reihenfolge, vec!["a", "b"]);
    }
}
