//! Unix-socket RPC server.
//!
//! Newline-delimited JSON: each line is a `Request`, each reply a
//! `Response`. Every connection is handled on its own task.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use ticket_common::ipc::{Request, Response};
use ticket_common::{ErrorClass, ErrorClass::*, TicketError, TicketResult};

use crate::state::DaemonState;

/// JSON-RPC style code for unparseable requests
const PARSE_ERROR: i32 = -32700;

pub async fn serve(listener: UnixListener, state: Arc<DaemonState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => error!("Accept error: {}", e),
        }
    }
}

/// Serve until `shutdown` resolves, then persist the registry one last
/// time and remove the socket file.
pub async fn serve_until<F>(
    listener: UnixListener,
    state: Arc<DaemonState>,
    socket: &Path,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        result = serve(listener, state.clone()) => result?,
        _ = shutdown => info!("Shutting down gracefully"),
    }

    state.engine.registry().flush();
    if socket.exists() {
        std::fs::remove_file(socket)
            .with_context(|| format!("Failed to remove socket {}", socket.display()))?;
    }
    info!(
        "ticketd stopped ({} open tickets persisted)",
        state.engine.registry().len()
    );
    Ok(())
}

async fn handle_connection(stream: UnixStream, state: Arc<DaemonState>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(request, &state).await,
            Err(e) => Response::Error {
                message: format!("Invalid request: {}", e),
                code: PARSE_ERROR,
                class: ErrorClass::Validation,
            },
        };

        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        line.clear();
    }

    Ok(())
}

/// Handle one request and log its failure at the level its class deserves
pub async fn dispatch(request: Request, state: &DaemonState) -> Response {
    let name = request.name();
    debug!("Received request: {}", name);

    match handle_request(request, state).await {
        Ok(data) => Response::success(data),
        Err(e) => {
            match e.class() {
                Validation | Authorization | Conflict => debug!("{} refused: {}", name, e),
                Dependency | ConfigurationDrift => warn!("{} failed: {}", name, e),
            }
            Response::from(&e)
        }
    }
}

fn to_value<T: Serialize>(value: T) -> TicketResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| TicketError::InvalidInput(format!("Unserialisable response: {}", e)))
}

async fn handle_request(request: Request, state: &DaemonState) -> TicketResult<serde_json::Value> {
    let engine = &state.engine;
    let admin = &state.admin;

    match request {
        Request::Ping => Ok(json!({
            "pong": true,
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "open_tickets": engine.registry().len(),
        })),

        Request::Create { actor, category } => to_value(engine.create(&actor, &category).await?),
        Request::SelectCategory {
            actor,
            category,
            panel_channel,
            panel_message,
        } => to_value(
            engine
                .create_from_panel(&actor, &category, &panel_channel, &panel_message)
                .await?,
        ),
        Request::Claim { actor, channel_id } => to_value(engine.claim(&actor, &channel_id).await?),
        Request::Unclaim { actor, channel_id } => to_value(engine.unclaim(&actor, &channel_id).await?),
        Request::ToggleClaim { actor, channel_id } => {
            to_value(engine.toggle_claim(&actor, &channel_id).await?)
        }
        Request::Close {
            actor,
            channel_id,
            reason,
        } => to_value(engine.close(&actor, &channel_id, reason.as_deref()).await?),
        Request::Tickets => to_value(engine.list()),

        Request::CategoryAdd {
            actor,
            name,
            description,
            color,
            emoji,
        } => to_value(
            admin
                .add_category(&actor, &name, &description, color.as_deref(), emoji.as_deref())
                .await?,
        ),
        Request::CategoryRemove { actor, name } => to_value(admin.remove_category(&actor, &name).await?),
        Request::CategoryEdit { actor, name, patch } => {
            to_value(admin.edit_category(&actor, &name, patch).await?)
        }
        Request::CategoryList { actor } => to_value(admin.list_categories(&actor)?),
        Request::CategoryInfo { actor, name } => to_value(admin.category_info(&actor, &name)?),
        Request::StaffRoleGrant {
            actor,
            category,
            role,
            scope,
        } => to_value(admin.grant_staff_role(&actor, &category, &role, scope).await?),
        Request::StaffRoleRevoke {
            actor,
            category,
            role,
            scope,
        } => to_value(admin.revoke_staff_role(&actor, &category, &role, scope).await?),
        Request::LegacyRoleGrant { actor, kind, role } => {
            to_value(admin.grant_legacy_role(&actor, kind, &role)?)
        }
        Request::LegacyRoleRevoke { actor, kind, role } => {
            to_value(admin.revoke_legacy_role(&actor, kind, &role)?)
        }
        Request::ChannelSet {
            actor,
            target,
            channel_id,
        } => to_value(admin.set_channel(&actor, target, &channel_id).await?),
        Request::SettingSet {
            actor,
            setting,
            value,
        } => to_value(admin.set_setting(&actor, setting, &value)?),
        Request::RefreshPanel { actor } => to_value(admin.refresh_panel(&actor).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TicketLifecycleEngine;
    use crate::memory_transport::MemoryTransport;
    use crate::registry::TicketRegistry;
    use crate::transcript::HtmlTranscriptExporter;
    use tempfile::tempdir;
    use ticket_common::{Actor, ConfigStore, TicketConfig};

    fn state(dir: &std::path::Path) -> Arc<DaemonState> {
        let transport = Arc::new(MemoryTransport::new());
        let container = transport.add_container();
        let mut config = TicketConfig::default();
        config.channels.ticket_category = Some(container);
        let engine = TicketLifecycleEngine::new(
            Arc::new(ConfigStore::in_memory(config)),
            Arc::new(TicketRegistry::new()),
            transport,
            Arc::new(HtmlTranscriptExporter::new(dir)),
        );
        Arc::new(DaemonState::new(Arc::new(engine)))
    }

    #[tokio::test]
    async fn test_dispatch_create_and_list() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        let actor = Actor::new("10", "una");

        let resp = dispatch(
            Request::Create {
                actor,
                category: "Billing".into(),
            },
            &state,
        )
        .await;
        assert!(resp.is_success());

        match dispatch(Request::Tickets, &state).await {
            Response::Success { data } => {
                assert_eq!(data.as_array().unwrap().len(), 1);
                assert_eq!(data[0]["record"]["category"], "Billing");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_error_carries_class() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        let resp = dispatch(
            Request::Claim {
                actor: Actor::new("10", "una"),
                channel_id: "nope".into(),
            },
            &state,
        )
        .await;
        match resp {
            Response::Error { class, code, message } => {
                assert_eq!(class, ErrorClass::Validation);
                assert_eq!(code, -32030);
                assert_eq!(message, "This is not a valid ticket channel.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_removes_socket() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("ticketd.sock");
        let index = crate::index::TicketIndex::in_dir(dir.path().join("state"));

        let transport = Arc::new(MemoryTransport::new());
        let engine = TicketLifecycleEngine::new(
            Arc::new(ConfigStore::in_memory(TicketConfig::default())),
            Arc::new(TicketRegistry::with_index(index.clone())),
            transport,
            Arc::new(HtmlTranscriptExporter::new(dir.path())),
        );
        // restored records are only written by an explicit flush
        engine.registry().restore(
            ticket_common::TicketRecord::open("c1", "ticket-una", "Billing", &Actor::new("10", "una")),
            Some("20".into()),
        );
        let state = Arc::new(DaemonState::new(Arc::new(engine)));

        let listener = UnixListener::bind(&socket).unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = {
            let socket = socket.clone();
            tokio::spawn(async move {
                serve_until(listener, state, &socket, async {
                    let _ = stopped.await;
                })
                .await
            })
        };

        assert!(socket.exists());
        stop.send(()).unwrap();
        server.await.unwrap().unwrap();

        assert!(!socket.exists());
        let saved = index.load().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved["c1"].claimed_by.as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("ticketd.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        tokio::spawn(serve(listener, state(dir.path())));

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"type\":\"ping\"}\nnot json\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let first: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(first.is_success());
        let second: Response = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert!(matches!(second, Response::Error { code: PARSE_ERROR, .. }));
    }
}
