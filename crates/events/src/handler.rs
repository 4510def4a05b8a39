use commerce_core::Aggregate;

/// Run a command against an aggregate in place: decide, then apply each
/// resulting event. No persistence or publication; the infra dispatcher
/// does that part.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
