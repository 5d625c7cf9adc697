use crate::mcp::types::{CapabilityDescriptor, CapabilityList, ContentItem};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Executes one published tool.
///
/// `Err` is reported to the client as a tool-level failure (`isError`), not
/// as a JSON-RPC error.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<Vec<ContentItem>, String>;
}

pub type TemplateRenderer = Arc<dyn Fn(&HashMap<String, String>) -> String + Send + Sync>;

#[derive(Debug)]
pub enum RegistryError {
    DuplicateCapability(String),
    InvalidSchema { name: String, message: String },
    DuplicateResource(String),
    DuplicatePrompt(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateCapability(name) => {
                write!(f, "Tool `{name}` is registered more than once")
            }
            RegistryError::InvalidSchema { name, message } => {
                write!(f, "Tool `{name}` has an invalid input schema: {message}")
            }
            RegistryError::DuplicateResource(uri) => {
                write!(f, "Resource `{uri}` is registered more than once")
            }
            RegistryError::DuplicatePrompt(name) => {
                write!(f, "Prompt `{name}` is registered more than once")
            }
        }
    }
}

impl StdError for RegistryError {}

struct RegisteredTool {
    descriptor: CapabilityDescriptor,
    validator: jsonschema::Validator,
    handler: Arc<dyn ToolHandler>,
}

#[derive(Debug, Clone)]
pub struct StaticResource {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: String,
    pub text: String,
}

#[derive(Clone)]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: String,
    pub render: TemplateRenderer,
}

#[derive(Debug, Clone)]
pub struct PromptArgument {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
}

#[derive(Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    pub render: TemplateRenderer,
}

/// Outcome of a tool call as seen by the server loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: Vec<ContentItem>,
    pub is_error: bool,
}

impl ToolOutput {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text(message.into())],
            is_error: true,
        }
    }
}

/// Everything a server publishes. Built once, then shared read-only.
pub struct CapabilityRegistry {
    server_name: String,
    server_version: String,
    tools: Vec<RegisteredTool>,
    resources: Vec<StaticResource>,
    templates: Vec<ResourceTemplate>,
    prompts: Vec<PromptTemplate>,
    page_size: Option<usize>,
}

impl CapabilityRegistry {
    pub fn builder(server_name: impl Into<String>, server_version: impl Into<String>) -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder {
            server_name: server_name.into(),
            server_version: server_version.into(),
            tools: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
            page_size: None,
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Descriptors in registration order.
    pub fn capabilities(&self) -> CapabilityList {
        CapabilityList::new(
            self.tools
                .iter()
                .map(|tool| tool.descriptor.clone())
                .collect(),
        )
    }

    /// One page of descriptors starting at `offset`, plus the offset of the
    /// next page when more remain.
    pub fn capability_page(&self, offset: usize) -> (Vec<CapabilityDescriptor>, Option<usize>) {
        let total = self.tools.len();
        let start = offset.min(total);
        let end = match self.page_size {
            Some(size) if size > 0 => (start + size).min(total),
            _ => total,
        };
        let page = self.tools[start..end]
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect();
        let next = (end < total).then_some(end);
        (page, next)
    }

    /// Validates `arguments` against the tool's schema and runs it.
    pub async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutput {
        let Some(tool) = self.tools.iter().find(|tool| tool.descriptor.name == name) else {
            return ToolOutput::failure(format!("Unknown tool: {name}"));
        };

        let instance = Value::Object(arguments.clone());
        let problems: Vec<String> = tool
            .validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect();
        if !problems.is_empty() {
            return ToolOutput::failure(format!(
                "Invalid arguments for {name}: {}",
                problems.join("; ")
            ));
        }

        match tool.handler.call(arguments).await {
            Ok(content) => ToolOutput {
                content,
                is_error: false,
            },
            Err(message) => ToolOutput::failure(message),
        }
    }

    pub fn resources(&self) -> &[StaticResource] {
        &self.resources
    }

    pub fn resource_templates(&self) -> &[ResourceTemplate] {
        &self.templates
    }

    /// Resolves a URI against static resources first, then templates.
    /// Returns the MIME type and text.
    pub fn read_resource(&self, uri: &str) -> Option<(String, String)> {
        if let Some(resource) = self.resources.iter().find(|resource| resource.uri == uri) {
            return Some((resource.mime_type.clone(), resource.text.clone()));
        }
        self.templates.iter().find_map(|template| {
            match_uri_template(&template.uri_template, uri)
                .map(|params| (template.mime_type.clone(), (template.render)(&params)))
        })
    }

    pub fn prompts(&self) -> &[PromptTemplate] {
        &self.prompts
    }

    pub fn render_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<(Option<String>, String), String> {
        let prompt = self
            .prompts
            .iter()
            .find(|prompt| prompt.name == name)
            .ok_or_else(|| format!("Unknown prompt: {name}"))?;
        if let Some(missing) = prompt
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(format!(
                "Missing required argument `{}` for prompt {name}",
                missing.name
            ));
        }
        Ok((prompt.description.clone(), (prompt.render)(arguments)))
    }
}

pub struct CapabilityRegistryBuilder {
    server_name: String,
    server_version: String,
    tools: Vec<(CapabilityDescriptor, Arc<dyn ToolHandler>)>,
    resources: Vec<StaticResource>,
    templates: Vec<ResourceTemplate>,
    prompts: Vec<PromptTemplate>,
    page_size: Option<usize>,
}

impl CapabilityRegistryBuilder {
    pub fn tool(mut self, descriptor: CapabilityDescriptor, handler: impl ToolHandler + 'static) -> Self {
        self.tools.push((descriptor, Arc::new(handler)));
        self
    }

    pub fn resource(mut self, resource: StaticResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn resource_template(mut self, template: ResourceTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompts.push(prompt);
        self
    }

    /// Splits `tools/list` responses into pages of `size` entries.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn build(self) -> Result<CapabilityRegistry, RegistryError> {
        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(self.tools.len());
        for (descriptor, handler) in self.tools {
            if !seen.insert(descriptor.name.clone()) {
                return Err(RegistryError::DuplicateCapability(descriptor.name));
            }
            let validator = jsonschema::validator_for(&descriptor.input_schema).map_err(|err| {
                RegistryError::InvalidSchema {
                    name: descriptor.name.clone(),
                    message: err.to_string(),
                }
            })?;
            tools.push(RegisteredTool {
                descriptor,
                validator,
                handler,
            });
        }

        let mut uris = HashSet::new();
        for resource in &self.resources {
            if !uris.insert(resource.uri.clone()) {
                return Err(RegistryError::DuplicateResource(resource.uri.clone()));
            }
        }
        for template in &self.templates {
            if !uris.insert(template.uri_template.clone()) {
                return Err(RegistryError::DuplicateResource(template.uri_template.clone()));
            }
        }

        let mut prompt_names = HashSet::new();
        for prompt in &self.prompts {
            if !prompt_names.insert(prompt.name.clone()) {
                return Err(RegistryError::DuplicatePrompt(prompt.name.clone()));
            }
        }

        Ok(CapabilityRegistry {
            server_name: self.server_name,
            server_version: self.server_version,
            tools,
            resources: self.resources,
            templates: self.templates,
            prompts: self.prompts,
            page_size: self.page_size,
        })
    }
}

/// Matches `uri` against a template such as `greeting://{name}` and returns
/// the captured placeholders. A placeholder never captures an empty string.
pub fn match_uri_template(template: &str, uri: &str) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();
    let mut rest_template = template;
    let mut rest_uri = uri;

    loop {
        match rest_template.find('{') {
            None => {
                return (rest_template == rest_uri).then_some(params);
            }
            Some(open) => {
                let literal = &rest_template[..open];
                rest_uri = rest_uri.strip_prefix(literal)?;
                let after_open = &rest_template[open + 1..];
                let close = after_open.find('}')?;
                let name = &after_open[..close];
                rest_template = &after_open[close + 1..];

                let next_literal_end = rest_template.find('{').unwrap_or(rest_template.len());
                let next_literal = &rest_template[..next_literal_end];
                let value_end = if next_literal.is_empty() {
                    rest_uri.len()
                } else {
                    rest_uri.find(next_literal)?
                };
                let value = &rest_uri[..value_end];
                if value.is_empty() {
                    return None;
                }
                params.insert(name.to_string(), value.to_string());
                rest_uri = &rest_uri[value_end..];
            }
        }
    }
}
