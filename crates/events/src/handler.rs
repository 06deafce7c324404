/// Decide and apply one command in place (no store, no bus).
///
/// `handle` runs first; state is only touched when it succeeds, so a
/// rejected command leaves the aggregate exactly as it was. Used by the
/// dispatcher to stage several commands against the same in-memory aggregate
/// before committing, and by unit tests.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: kasaku_core::Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
