//! CloudFormation template model.
//!
//! Stacks add resources through a [`StackScope`], which derives stable logical
//! ids from construct paths. A finished [`Template`] can be checked for
//! dangling references and dependency cycles before it is written out.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
const LOGICAL_ID_HASH_LEN: usize = 8;
const LOGICAL_ID_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error("duplicate logical id '{0}'")]
    DuplicateLogicalId(String),
    #[error("duplicate output '{0}'")]
    DuplicateOutput(String),
    #[error("'{from}' references unknown resource '{target}'")]
    DanglingReference { from: String, target: String },
    #[error("dependency cycle among resources: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
    #[error("stack '{stack}' needs the {section} configuration section")]
    MissingConfigSection {
        stack: &'static str,
        section: &'static str,
    },
    #[error("failed to serialize template: {0}")]
    Serialization(String),
    #[error("failed to write cloud assembly: {0}")]
    Io(String),
}

/// Intrinsic function helpers. Each returns the JSON fragment CloudFormation
/// resolves at deploy time.
pub mod intrinsic {
    use serde_json::{json, Value};

    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const REGION: &str = "AWS::Region";
    pub const PARTITION: &str = "AWS::Partition";
    pub const URL_SUFFIX: &str = "AWS::URLSuffix";

    pub fn reference(logical_id: &str) -> Value {
        json!({ "Ref": logical_id })
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id, attribute] })
    }

    pub fn sub(template: impl Into<String>) -> Value {
        json!({ "Fn::Sub": template.into() })
    }

    pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
        json!({ "Fn::Join": [delimiter, parts] })
    }

    pub fn select(index: usize, list: Value) -> Value {
        json!({ "Fn::Select": [index, list] })
    }

    pub fn get_azs() -> Value {
        json!({ "Fn::GetAZs": "" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "is_empty_object")]
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|object| object.is_empty())
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        let logical_id = logical_id.into();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
        self
    }

    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Not part of the template; tells callers to redact the resolved value.
    #[serde(skip)]
    pub sensitive: bool,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
            sensitive: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION,
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_resource(&mut self, logical_id: String, resource: Resource) -> Result<(), SynthError> {
        if self.resources.contains_key(&logical_id) {
            return Err(SynthError::DuplicateLogicalId(logical_id));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    pub fn add_output(&mut self, name: impl Into<String>, output: Output) -> Result<(), SynthError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(SynthError::DuplicateOutput(name));
        }
        self.outputs.insert(name, output);
        Ok(())
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
            .map(|(id, resource)| (id.as_str(), resource))
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    /// Returns the single resource of `resource_type`, if exactly one exists.
    pub fn single_of_type(&self, resource_type: &str) -> Option<(&str, &Resource)> {
        let mut matches = self
            .resources
            .iter()
            .filter(|(_, resource)| resource.resource_type == resource_type);
        let (id, resource) = matches.next()?;
        matches.next().is_none().then_some((id.as_str(), resource))
    }

    /// Compact form, used as the template body of a deployment request.
    pub fn to_json(&self) -> Result<String, SynthError> {
        serde_json::to_string(self).map_err(|error| SynthError::Serialization(error.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, SynthError> {
        serde_json::to_string_pretty(self).map_err(|error| SynthError::Serialization(error.to_string()))
    }

    pub fn to_value(&self) -> Result<Value, SynthError> {
        serde_json::to_value(self).map_err(|error| SynthError::Serialization(error.to_string()))
    }

    /// Logical ids a resource depends on, through references or `DependsOn`.
    pub fn dependencies_of(&self, logical_id: &str) -> BTreeSet<String> {
        let Some(resource) = self.resources.get(logical_id) else {
            return BTreeSet::new();
        };
        let mut targets = BTreeSet::new();
        collect_references(&resource.properties, &mut targets);
        targets.extend(resource.depends_on.iter().cloned());
        targets
    }

    /// Rejects references to unknown resources and dependency cycles.
    pub fn validate(&self) -> Result<(), SynthError> {
        for logical_id in self.resources.keys() {
            for target in self.dependencies_of(logical_id) {
                if !self.resources.contains_key(&target) {
                    return Err(SynthError::DanglingReference {
                        from: logical_id.clone(),
                        target,
                    });
                }
            }
        }

        for (name, output) in &self.outputs {
            let mut targets = BTreeSet::new();
            collect_references(&output.value, &mut targets);
            if let Some(target) = targets
                .into_iter()
                .find(|target| !self.resources.contains_key(target))
            {
                return Err(SynthError::DanglingReference {
                    from: format!("Outputs.{name}"),
                    target,
                });
            }
        }

        self.deployment_order().map(|_| ())
    }

    /// Topological order of the resource graph; ties break alphabetically.
    pub fn deployment_order(&self) -> Result<Vec<String>, SynthError> {
        let mut remaining: BTreeMap<String, BTreeSet<String>> = self
            .resources
            .keys()
            .map(|id| {
                let deps = self
                    .dependencies_of(id)
                    .into_iter()
                    .filter(|target| self.resources.contains_key(target))
                    .collect();
                (id.clone(), deps)
            })
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(id, _)| id.clone())
                .collect();

            if ready.is_empty() {
                return Err(SynthError::DependencyCycle(remaining.into_keys().collect()));
            }

            for id in &ready {
                remaining.remove(id);
            }
            for deps in remaining.values_mut() {
                for id in &ready {
                    deps.remove(id);
                }
            }
            order.extend(ready);
        }

        Ok(order)
    }
}

fn collect_references(value: &Value, targets: &mut BTreeSet<String>) {
    match value {
        Value::Object(object) => {
            if object.len() == 1 {
                if let Some(Value::String(target)) = object.get("Ref") {
                    if !target.starts_with("AWS::") {
                        targets.insert(target.clone());
                    }
                    return;
                }
                if let Some(Value::Array(parts)) = object.get("Fn::GetAtt") {
                    if let Some(Value::String(target)) = parts.first() {
                        targets.insert(target.clone());
                    }
                    return;
                }
                if let Some(Value::String(text)) = object.get("Fn::Sub") {
                    collect_sub_references(text, targets);
                    return;
                }
            }
            for nested in object.values() {
                collect_references(nested, targets);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, targets);
            }
        }
        _ => {}
    }
}

fn collect_sub_references(text: &str, targets: &mut BTreeSet<String>) {
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let token = &after[..end];
        // `${!Literal}` is an escape, `AWS::` tokens are pseudo parameters.
        if !token.starts_with('!') && !token.starts_with("AWS::") {
            let target = token.split('.').next().unwrap_or(token);
            targets.insert(target.to_string());
        }
        rest = &after[end + 1..];
    }
}

/// Derives a logical id from a construct path: the alphanumeric characters of
/// each component followed by a short hash of the full path.
pub fn logical_id(path: &[&str]) -> String {
    let readable: String = path
        .iter()
        .flat_map(|component| component.chars())
        .filter(char::is_ascii_alphanumeric)
        .collect();

    let digest = Sha256::digest(path.join("/").as_bytes());
    let hash: String = digest
        .iter()
        .take(LOGICAL_ID_HASH_LEN / 2)
        .map(|byte| format!("{byte:02X}"))
        .collect();

    let max_readable = LOGICAL_ID_MAX_LEN - LOGICAL_ID_HASH_LEN;
    let readable = if readable.len() > max_readable {
        &readable[readable.len() - max_readable..]
    } else {
        readable.as_str()
    };
    format!("{readable}{hash}")
}

/// The construction context of one stack: its name and the template being built.
#[derive(Debug, Clone)]
pub struct StackScope {
    stack_name: String,
    template: Template,
}

impl StackScope {
    pub fn new(stack_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            template: Template::new().with_description(description),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    /// Adds a resource under `path` and returns its logical id.
    pub fn add(&mut self, path: &[&str], resource: Resource) -> Result<String, SynthError> {
        let id = logical_id(path);
        self.template.add_resource(id.clone(), resource)?;
        Ok(id)
    }

    pub fn output(&mut self, name: &str, output: Output) -> Result<(), SynthError> {
        self.template.add_output(name, output)
    }

    /// The `Name` tag value the console shows for a construct.
    pub fn name_tag(&self, path: &[&str]) -> Value {
        json!({ "Key": "Name", "Value": format!("{}/{}", self.stack_name, path.join("/")) })
    }

    pub fn finish(self) -> Result<Template, SynthError> {
        self.template.validate()?;
        Ok(self.template)
    }
}
