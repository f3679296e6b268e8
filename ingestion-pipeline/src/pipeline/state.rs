use state_machines::state_machine;

state_machine! {
    name: DocumentMachine,
    state: DocumentState,
    initial: Ready,
    states: [Ready, Extracted, Chunked, Embedded, Indexed, Failed],
    events {
        extract { transition: { from: Ready, to: Extracted } }
        chunk { transition: { from: Extracted, to: Chunked } }
        embed { transition: { from: Chunked, to: Embedded } }
        index { transition: { from: Embedded, to: Indexed } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Chunked, to: Failed }
            transition: { from: Embedded, to: Failed }
            transition: { from: Indexed, to: Failed }
        }
    }
}

pub fn ready() -> DocumentMachine<(), Ready> {
    DocumentMachine::new(())
}
