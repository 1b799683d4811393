// Static Workflow Validation
// Reports duplicate task names and depends-on entries that name no
// compiled task. Findings never abort compilation by themselves.

use crate::compiler::error::ValidationError;
use crate::compiler::models::Workflow;

use std::collections::{HashMap, HashSet};

pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Run every static check over a compiled workflow.
    pub fn validate(workflow: &Workflow) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        errors.extend(Self::check_duplicate_names(workflow));
        errors.extend(Self::check_dangling_dependencies(workflow));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Every task name declared more than once, reported once per name
    /// in first-occurrence order.
    pub fn check_duplicate_names(workflow: &Workflow) -> Vec<ValidationError> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for task in &workflow.tasks {
            *counts.entry(task.name.as_str()).or_insert(0) += 1;
        }

        let mut reported = HashSet::new();
        let mut errors = Vec::new();
        for task in &workflow.tasks {
            let count = counts[task.name.as_str()];
            if count > 1 && reported.insert(task.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("task name is declared {} times", count),
                    &task.name,
                ));
            }
        }
        errors
    }

    /// Every `depends-on` entry that does not name a compiled task.
    pub fn check_dangling_dependencies(workflow: &Workflow) -> Vec<ValidationError> {
        let names: HashSet<&str> = workflow.tasks.iter().map(|t| t.name.as_str()).collect();

        let mut errors = Vec::new();
        for task in &workflow.tasks {
            for dependency in &task.depends_on {
                if !names.contains(dependency.as_str()) {
                    errors.push(ValidationError::new(
                        format!("depends on unknown task '{}'", dependency),
                        &task.name,
                    ));
                }
            }
        }
        errors
    }
}
