use crate::tags;
use crate::{FunctionArguments, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name under which the main input of a flow is available to its steps
pub const ROOT_SYMBOL: &str = "_";

/// Answers whether an operator is available, used while validating flows
pub trait OperatorLookup {
    fn has_operator(&self, name: &str) -> bool;
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One operator invocation within a flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDesc {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub operator: String,
    #[serde(default)]
    pub function: String,
    #[serde(default, skip_serializing_if = "FunctionArguments::is_empty")]
    pub arguments: FunctionArguments,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input_from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arguments_from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub execute_on_success_of: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub execute_on_fail_of: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_main_args: bool,
}

impl StepDesc {
    pub fn new(operator: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            function: function.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.append(key, value);
        self
    }

    pub fn with_input_from(mut self, name: impl Into<String>) -> Self {
        self.input_from = name.into();
        self
    }

    pub fn with_arguments_from(mut self, name: impl Into<String>) -> Self {
        self.arguments_from = name.into();
        self
    }

    pub fn on_success_of(mut self, name: impl Into<String>) -> Self {
        self.execute_on_success_of = name.into();
        self
    }

    pub fn on_fail_of(mut self, name: impl Into<String>) -> Self {
        self.execute_on_fail_of = name.into();
        self
    }

    pub fn with_main_args(mut self) -> Self {
        self.use_main_args = true;
        self
    }
}

/// Declarative definition of a flow: ordered steps plus metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDesc {
    /// Assigned when the flow is registered; restored from the file name on load
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_from: String,
    #[serde(default, alias = "operations")]
    pub steps: Vec<StepDesc>,
}

impl FlowDesc {
    pub fn new(steps: Vec<StepDesc>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_output_from(mut self, name: impl Into<String>) -> Self {
        self.output_from = name.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_tags(tags);
        self
    }

    pub fn add_step(&mut self, step: StepDesc) {
        self.steps.push(step);
    }

    /// Adds tags and removes duplicates, keeping first occurrences in order
    pub fn add_tags<I, S>(&mut self, new_tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(new_tags.into_iter().map(Into::into));
        self.dedup_tags();
    }

    /// Removes a tag and any duplicates
    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
        self.dedup_tags();
    }

    pub fn dedup_tags(&mut self) {
        let mut seen = HashSet::new();
        self.tags.retain(|t| seen.insert(t.clone()));
    }

    /// Value of the first tag with key `key` (case-insensitive), "" if unset or valueless
    pub fn tag_value(&self, key: &str) -> &str {
        self.tags
            .iter()
            .map(|t| tags::split_tag(t))
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
            .unwrap_or("")
    }

    pub fn has_all_tags<S: AsRef<str>>(&self, expected: &[S]) -> bool {
        tags::has_all_tags(&self.tags, expected)
    }

    pub fn has_at_least_one_tag<S: AsRef<str>>(&self, expected: &[S]) -> bool {
        tags::has_at_least_one_tag(&self.tags, expected)
    }

    pub fn has_at_least_one_tag_per_group<S: AsRef<str>>(&self, groups: &[Vec<S>]) -> bool {
        tags::has_at_least_one_tag_per_group(&self.tags, groups)
    }

    /// Renames a step and every reference to it
    pub fn rename_step(&mut self, old_name: &str, new_name: &str) {
        let rename = |field: &mut String| {
            if field == old_name {
                *field = new_name.to_string();
            }
        };
        for step in &mut self.steps {
            rename(&mut step.name);
            rename(&mut step.input_from);
            rename(&mut step.arguments_from);
            rename(&mut step.execute_on_success_of);
            rename(&mut step.execute_on_fail_of);
        }
        rename(&mut self.output_from);
    }

    /// Validates the description and returns a completed copy.
    ///
    /// The copy carries `id`, a default display name, a name for every step
    /// and, for single-step flows, an `output_from`. `self` is left untouched.
    pub fn complete(
        &self,
        id: &str,
        operators: &dyn OperatorLookup,
    ) -> Result<FlowDesc, ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps);
        }

        let mut complete = self.clone();
        complete.id = id.to_string();
        if complete.display_name.is_empty() && id.chars().count() > 1 {
            let mut chars = id.chars();
            if let Some(first) = chars.next() {
                complete.display_name = first.to_uppercase().chain(chars).collect();
            }
        }

        let mut known: HashSet<String> = HashSet::new();
        known.insert(ROOT_SYMBOL.to_string());

        for (i, step) in complete.steps.iter_mut().enumerate() {
            if step.name == ROOT_SYMBOL {
                return Err(ValidationError::ReservedName);
            }
            if step.name.is_empty() {
                step.name = format!("#{}", i);
            }
            if known.contains(&step.name) {
                return Err(ValidationError::DuplicateName(step.name.clone()));
            }
            if !operators.has_operator(&step.operator) {
                return Err(ValidationError::UnknownOperator {
                    step: step.name.clone(),
                    operator: step.operator.clone(),
                });
            }

            let references = [
                ("argumentsFrom", &step.arguments_from),
                ("inputFrom", &step.input_from),
                ("executeOnSuccessOf", &step.execute_on_success_of),
                ("executeOnFailOf", &step.execute_on_fail_of),
            ];
            for (field, target) in references {
                if !target.is_empty() && !known.contains(target) {
                    return Err(ValidationError::UnknownReference {
                        step: step.name.clone(),
                        field,
                        target: target.clone(),
                    });
                }
            }

            if !step.execute_on_fail_of.is_empty() {
                if step.execute_on_fail_of == step.input_from {
                    return Err(ValidationError::AmbiguousCondition {
                        step: step.name.clone(),
                        field: "inputFrom",
                        target: step.execute_on_fail_of.clone(),
                    });
                }
                if step.execute_on_fail_of == step.execute_on_success_of {
                    return Err(ValidationError::AmbiguousCondition {
                        step: step.name.clone(),
                        field: "executeOnSuccessOf",
                        target: step.execute_on_fail_of.clone(),
                    });
                }
            }

            known.insert(step.name.clone());
        }

        if complete.output_from.is_empty() {
            if complete.steps.len() == 1 {
                complete.output_from = complete.steps[0].name.clone();
            }
        } else if !known.contains(&complete.output_from) {
            return Err(ValidationError::UnknownOutputFrom(complete.output_from));
        }

        Ok(complete)
    }
}
