use anp_core::Instance;
use std::collections::HashMap;
use tracing::warn;

/// Per-instance retention, same as the launcher keeps server side.
pub const MAX_OUTPUT_LINES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged,
}

/// Client-side mirror of launcher instances, keyed by id and iterated in
/// first-seen order.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    order: Vec<String>,
    entries: HashMap<String, Instance>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Instance> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn upsert(&mut self, mut instance: Instance) -> UpsertOutcome {
        cap_output(&mut instance.output);
        match self.entries.get_mut(&instance.id) {
            Some(existing) => {
                merge_instance(existing, instance);
                UpsertOutcome::Merged
            }
            None => {
                self.order.push(instance.id.clone());
                self.entries.insert(instance.id.clone(), instance);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Bulk replace from an `init` snapshot. Duplicate ids inside the
    /// snapshot collapse through the normal merge.
    pub fn replace_all(&mut self, instances: Vec<Instance>) {
        self.order.clear();
        self.entries.clear();
        for instance in instances {
            self.upsert(instance);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Instance> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|known| known != id);
        Some(removed)
    }

    pub fn append_output(&mut self, id: &str, line: &str) -> bool {
        let Some(instance) = self.entries.get_mut(id) else {
            warn!(
                event = "registry_output_unknown_instance",
                instance_id = id,
                "output for instance not in registry"
            );
            return false;
        };
        instance.output.push(line.to_string());
        cap_output(&mut instance.output);
        true
    }

    pub fn set_status(&mut self, id: &str, status: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(instance) => {
                instance.status = status.to_string();
                true
            }
            None => false,
        }
    }

    pub fn reset_output(&mut self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(instance) => {
                instance.output.clear();
                true
            }
            None => false,
        }
    }
}

fn merge_instance(existing: &mut Instance, incoming: Instance) {
    let Instance {
        id: _,
        command,
        status,
        name,
        port,
        did,
        url,
        start_time,
        output,
    } = incoming;
    existing.command = command;
    if !status.is_empty() {
        existing.status = status;
    }
    if name.is_some() {
        existing.name = name;
    }
    if port.is_some() {
        existing.port = port;
    }
    if did.is_some() {
        existing.did = did;
    }
    if url.is_some() {
        existing.url = url;
    }
    if !start_time.is_empty() {
        existing.start_time = start_time;
    }
    if existing.output.is_empty() && !output.is_empty() {
        existing.output = output;
    }
}

fn cap_output(output: &mut Vec<String>) {
    if output.len() > MAX_OUTPUT_LINES {
        let excess = output.len() - MAX_OUTPUT_LINES;
        output.drain(..excess);
    }
}
