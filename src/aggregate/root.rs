use uuid::Uuid;

/// Aggregate root contract.
///
/// `handle_command` must not mutate; `apply_event` must not fail for an
/// event that `handle_command` produced from the same state.
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Validate a command and emit the events it results in
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Fold one event into state, bumping the version
    fn apply_event(&mut self, event: &Self::Event);

    fn aggregate_id(&self) -> Uuid;

    fn version(&self) -> i64;

    /// Handle a command and apply the resulting events in place.
    fn execute(&mut self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle_command(&command)?;
        for event in &events {
            self.apply_event(event);
        }
        Ok(events)
    }
}
