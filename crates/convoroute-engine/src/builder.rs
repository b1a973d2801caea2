//! Chainable construction of frozen route graphs.
//!
//! Steps declared without an explicit transition are linked linearly to the
//! next declared step; the last one terminates. Branch children are added as
//! real steps of the route and default to terminal unless they name their
//! own successor, so fan-outs can rejoin any downstream step by id.

use std::collections::HashMap;

use convoroute_core::{FlowError, Result, SessionState};

use crate::condition::Condition;
use crate::guideline::Guideline;
use crate::route::{FieldSpec, OnComplete, Route};
use crate::step::{Branch, Step, StepTransition, ToolRef};

#[derive(Debug, Default)]
pub struct StepBuilder {
    id: Option<String>,
    description: Option<String>,
    prompt: String,
    collect: Vec<String>,
    requires: Vec<String>,
    when: Option<Condition>,
    skip_if: Option<Condition>,
    tools: Vec<ToolRef>,
    transition: Option<StepTransition>,
}

impl StepBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Step without an explicit id; `RouteBuilder::build` assigns `step_N`.
    pub fn unnamed() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn collect<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collect = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn requires<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn when(mut self, condition: impl Into<Condition>) -> Self {
        self.when = Some(condition.into());
        self
    }

    pub fn skip_if(mut self, condition: impl Into<Condition>) -> Self {
        self.skip_if = Some(condition.into());
        self
    }

    pub fn tool(mut self, tool: ToolRef) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn next(mut self, step_id: impl Into<String>) -> Self {
        self.transition = Some(StepTransition::Next(step_id.into()));
        self
    }

    pub fn end(mut self) -> Self {
        self.transition = Some(StepTransition::End);
        self
    }

    /// Add one named branch edge. A duplicate name overwrites the earlier
    /// target in place: last write wins.
    pub fn branch(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        let target = target.into();
        let mut branches = match self.transition.take() {
            Some(StepTransition::Branches(branches)) => branches,
            _ => Vec::new(),
        };
        if let Some(existing) = branches.iter_mut().find(|b| b.name == name) {
            tracing::warn!(branch = %name, "duplicate branch name, replacing earlier target");
            existing.target = target;
        } else {
            branches.push(Branch { name, target });
        }
        self.transition = Some(StepTransition::Branches(branches));
        self
    }

    pub fn branches<I, N, T>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        for (name, target) in entries {
            self = self.branch(name, target);
        }
        self
    }

    fn into_step(self, id: String) -> Step {
        Step {
            description: self.description.unwrap_or_else(|| id.clone()),
            id,
            prompt: self.prompt,
            collect: self.collect,
            requires: self.requires,
            when: self.when,
            skip_if: self.skip_if,
            tools: self.tools,
            transition: self.transition.unwrap_or(StepTransition::End),
        }
    }
}

pub struct RouteBuilder {
    id: String,
    title: String,
    description: String,
    schema: HashMap<String, FieldSpec>,
    required_fields: Vec<String>,
    optional_fields: Vec<String>,
    guidelines: Vec<Guideline>,
    on_complete: Option<OnComplete>,
    initial: Option<String>,
    steps: Vec<StepBuilder>,
    // main-chain indices, used for implicit linear linking
    chain: Vec<usize>,
    error: Option<FlowError>,
}

impl RouteBuilder {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            schema: HashMap::new(),
            required_fields: Vec::new(),
            optional_fields: Vec::new(),
            guidelines: Vec::new(),
            on_complete: None,
            initial: None,
            steps: Vec::new(),
            chain: Vec::new(),
            error: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.schema.insert(name.into(), spec);
        self
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn guideline(mut self, guideline: Guideline) -> Self {
        self.guidelines.push(guideline);
        self
    }

    pub fn on_complete(mut self, route_title: impl Into<String>) -> Self {
        self.on_complete = Some(OnComplete::Title(route_title.into()));
        self
    }

    pub fn on_complete_with<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&SessionState) -> Option<String> + Send + Sync + 'static,
    {
        self.on_complete = Some(OnComplete::Resolver(std::sync::Arc::new(resolver)));
        self
    }

    pub fn initial(mut self, step_id: impl Into<String>) -> Self {
        self.initial = Some(step_id.into());
        self
    }

    /// Append a step to the main chain.
    pub fn step(mut self, step: StepBuilder) -> Self {
        self.chain.push(self.steps.len());
        self.steps.push(step);
        self
    }

    /// Fan the most recent main-chain step out into named children. Every
    /// child becomes a step of the route; duplicate names overwrite the
    /// earlier edge (last write wins) while both children stay registered.
    pub fn branch<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = (N, StepBuilder)>,
        N: Into<String>,
    {
        let Some(&parent_index) = self.chain.last() else {
            self.error.get_or_insert(FlowError::InvalidDefinition(format!(
                "route '{}': branch() with no preceding step",
                self.id
            )));
            return self;
        };

        for (name, mut child) in children {
            if child.id.is_none() {
                child.id = Some(format!("step_{}", self.steps.len() + 1));
            }
            let target = child.id.clone().expect("child id just ensured");
            // Branch children terminate unless they name a successor.
            if child.transition.is_none() {
                child.transition = Some(StepTransition::End);
            }
            let parent = std::mem::take(&mut self.steps[parent_index]);
            self.steps[parent_index] = parent.branch(name, target);
            self.steps.push(child);
        }
        self
    }

    pub fn build(mut self) -> Result<Route> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        // Assign ids to unnamed steps, then reject duplicates.
        for (index, step) in self.steps.iter_mut().enumerate() {
            if step.id.is_none() {
                step.id = Some(format!("step_{}", index + 1));
            }
        }
        let mut seen = HashMap::new();
        for step in &self.steps {
            let id = step.id.clone().expect("id assigned above");
            if seen.insert(id.clone(), ()).is_some() {
                return Err(FlowError::InvalidDefinition(format!(
                    "route '{}' declares step id '{}' twice",
                    self.id, id
                )));
            }
        }

        // Implicit linear linking along the main chain.
        for window in self.chain.windows(2) {
            let (current, following) = (window[0], window[1]);
            if self.steps[current].transition.is_none() {
                let next_id = self.steps[following].id.clone().expect("id assigned");
                self.steps[current].transition = Some(StepTransition::Next(next_id));
            }
        }

        let initial_step = match self.initial {
            Some(id) => id,
            None => match self.chain.first() {
                Some(&index) => self.steps[index].id.clone().expect("id assigned"),
                None => String::new(),
            },
        };

        let steps: HashMap<String, Step> = self
            .steps
            .into_iter()
            .map(|builder| {
                let id = builder.id.clone().expect("id assigned");
                (id.clone(), builder.into_step(id))
            })
            .collect();

        let route = Route {
            id: self.id,
            title: self.title,
            description: self.description,
            schema: self.schema,
            required_fields: self.required_fields,
            optional_fields: self.optional_fields,
            initial_step,
            steps,
            guidelines: self.guidelines,
            on_complete: self.on_complete,
        };
        route.validate()?;
        Ok(route)
    }
}
