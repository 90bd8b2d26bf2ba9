use crate::action::{ActionDescriptor, ActionInfo};
use crate::context::ExecutionContext;
use crate::error::{DispatchError, Result};

/// The set of actions an embedding program knows about.
///
/// Populated once before dispatch and read-only afterwards. Lookup walks the
/// actions in registration order, so if two actions share an identifier the
/// first one registered wins. [`Registry::register`] logs such collisions;
/// [`Registry::try_register`] refuses them.
#[derive(Debug, Default)]
pub struct Registry {
    actions: Vec<ActionDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `_help` and `_dry_run` actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::register_builtins(&mut registry);
        registry
    }

    /// Append an action. Identifier collisions are logged, not rejected.
    pub fn register(&mut self, descriptor: ActionDescriptor) -> &mut Self {
        warn_unused_parser(&descriptor);
        if let Some((identifier, existing)) = self.collision(&descriptor) {
            tracing::warn!(
                action = %descriptor.name,
                %identifier,
                %existing,
                "identifier already registered, lookups will resolve to the earlier action"
            );
        }
        self.actions.push(descriptor);
        self
    }

    /// Append an action, refusing it if any of its identifiers is taken.
    pub fn try_register(&mut self, descriptor: ActionDescriptor) -> Result<&mut Self> {
        if let Some((identifier, existing)) = self.collision(&descriptor) {
            return Err(DispatchError::DuplicateIdentifier {
                identifier,
                existing,
            });
        }
        warn_unused_parser(&descriptor);
        self.actions.push(descriptor);
        Ok(self)
    }

    /// Register a descriptor together with its behavior.
    pub fn register_fn<F>(&mut self, descriptor: ActionDescriptor, executor: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.register(descriptor.executor(executor))
    }

    /// First action whose name or alias equals `identifier`.
    pub fn find(&self, identifier: &str) -> Result<&ActionDescriptor> {
        self.actions
            .iter()
            .find(|action| action.matches(identifier))
            .ok_or_else(|| DispatchError::Lookup {
                identifier: identifier.to_owned(),
            })
    }

    /// Canonical names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name.clone()).collect()
    }

    /// Names and aliases, in registration order.
    pub fn names_and_aliases(&self) -> Vec<String> {
        self.actions
            .iter()
            .flat_map(|a| a.identifiers().map(str::to_owned))
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ActionDescriptor> {
        self.actions.iter()
    }

    pub fn describe(&self) -> Vec<ActionInfo> {
        self.actions.iter().map(ActionDescriptor::info).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn collision(&self, descriptor: &ActionDescriptor) -> Option<(String, String)> {
        descriptor.identifiers().find_map(|identifier| {
            self.actions
                .iter()
                .find(|existing| existing.matches(identifier))
                .map(|existing| (identifier.to_owned(), existing.name.clone()))
        })
    }
}

fn warn_unused_parser(descriptor: &ActionDescriptor) {
    if descriptor.private_parser.is_some() && !descriptor.owns_remaining_args {
        tracing::warn!(
            action = %descriptor.name,
            "private parser ignored, the action doesn't own the remaining args"
        );
    }
}
