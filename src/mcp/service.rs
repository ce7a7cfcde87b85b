//! MCP service implementation using rmcp.
//!
//! This module defines `SqlToolService`, which publishes the four database
//! tools and hands every call, with its raw argument object and the
//! request's cancellation token, to the `ToolDispatcher`.

use crate::models::Command;
use crate::tools::{
    ExecuteInput, QueryInput, SchemaInput, ToolDispatcher, TransactionInput, execute, query,
    schema, transaction,
};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject,
        ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
        Tool,
    },
    schemars::JsonSchema,
    service::RequestContext,
};
use std::sync::Arc;
use tracing::info;

/// JSON schema of a tool's input type, as an object.
fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = rmcp::schemars::schema_for!(T);
    let object = match serde_json::to_value(schema) {
        Ok(serde_json::Value::Object(object)) => object,
        _ => JsonObject::new(),
    };
    Arc::new(object)
}

/// The published tool list, in a fixed order.
pub fn tool_definitions() -> Vec<Tool> {
    Command::ALL
        .into_iter()
        .map(|command| {
            let (description, schema) = match command {
                Command::Execute => (execute::DESCRIPTION, input_schema::<ExecuteInput>()),
                Command::Query => (query::DESCRIPTION, input_schema::<QueryInput>()),
                Command::Schema => (schema::DESCRIPTION, input_schema::<SchemaInput>()),
                Command::Transaction => {
                    (transaction::DESCRIPTION, input_schema::<TransactionInput>())
                }
            };
            Tool::new(command.tool_name(), description, schema)
        })
        .collect()
}

#[derive(Clone)]
pub struct SqlToolService {
    dispatcher: Arc<ToolDispatcher>,
    tools: Arc<Vec<Tool>>,
}

impl SqlToolService {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            dispatcher,
            tools: Arc::new(tool_definitions()),
        }
    }

    fn instructions(&self) -> String {
        let registry = self.dispatcher.registry();
        let databases = registry.names().join(", ");
        let database_note = match registry.default_database() {
            Some(name) => format!(
                "This server manages one database ('{}'); the `database` argument may be omitted.",
                name
            ),
            None => format!(
                "Every call must name its target in `database`. Available: {}.",
                databases
            ),
        };
        format!(
            "SQL tools for one or more named databases.\n\
            \n\
            ## Tools\n\
            - `execute_tool`: run a statement, returns {{rowsAffected}}\n\
            - `query_tool`: run a query, returns {{columns, rows, rowCount}}\n\
            - `schema_tool`: describe a table's columns\n\
            - `transaction_tool`: run statements atomically, one argument list per statement\n\
            \n\
            ## Databases\n\
            {}\n\
            \n\
            Values in `arguments` are always bound as parameters, never spliced into SQL.",
            database_note
        )
    }
}

impl ServerHandler for SqlToolService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                title: Some("SQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(self.instructions()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools.as_ref().clone()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(tool = %request.name, "Tool call received");
        let output = self
            .dispatcher
            .dispatch(&request.name, request.arguments.as_ref(), &context.ct)
            .await?;
        Ok(CallToolResult::success(vec![Content::json(&output)?]))
    }
}
