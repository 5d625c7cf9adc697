use crate::mcp::client::McpSession;
use crate::mcp::error::McpError;
use crate::mcp::types::{InvocationRequest, ResultEnvelope};
use tracing::debug;

/// Sends one invocation and hands back the server's envelope untouched.
///
/// Capability names are not checked here; callers resolve them against the
/// session's capability list first.
pub async fn dispatch(
    session: &mut McpSession,
    request: &InvocationRequest,
) -> Result<ResultEnvelope, McpError> {
    debug!(
        server_id = %session.server_id(),
        tool = %request.capability_name,
        argument_count = request.arguments.len(),
        "Dispatching tool invocation"
    );
    let envelope = session.invoke(request).await?;
    debug!(
        server_id = %session.server_id(),
        tool = %request.capability_name,
        is_error = envelope.is_error,
        items = envelope.content.len(),
        "Tool invocation finished"
    );
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::server::serve;
    use crate::mcp::server::tools::{demo_registry, DemoServerOptions};
    use crate::mcp::types::ContentItem;
    use serde_json::Map;
    use std::sync::Arc;
    use tokio::io::duplex;

    #[tokio::test]
    async fn dispatch_passes_the_envelope_through() {
        let registry = Arc::new(demo_registry(DemoServerOptions::default()).expect("registry"));
        let (client_out, server_in) = duplex(16 * 1024);
        let (server_out, client_in) = duplex(16 * 1024);
        tokio::spawn(async move {
            let _ = serve(registry, server_in, server_out).await;
        });
        let mut session = McpSession::from_streams("demo", client_in, client_out);
        session.initialize().await.expect("initialize");

        let mut arguments = Map::new();
        arguments.insert("name".to_string(), "Ada".into());
        let envelope = dispatch(&mut session, &InvocationRequest::new("hello_world", arguments))
            .await
            .expect("dispatch");
        assert_eq!(
            envelope,
            ResultEnvelope::success(vec![ContentItem::Text("Hello, Ada!".to_string())])
        );
    }
}
