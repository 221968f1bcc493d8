use state_machines::state_machine;

state_machine! {
    name: QueryMachine,
    state: QueryState,
    initial: Routing,
    states: [Routing, Greeting, Searching, Listing, FormattingContext, GeneratingAnswer, Done],
    events {
        greet { transition: { from: Routing, to: Greeting } }
        search { transition: { from: Routing, to: Searching } }
        list { transition: { from: Searching, to: Listing } }
        format { transition: { from: Searching, to: FormattingContext } }
        generate { transition: { from: FormattingContext, to: GeneratingAnswer } }
        finish {
            transition: { from: Greeting, to: Done }
            transition: { from: Listing, to: Done }
            transition: { from: GeneratingAnswer, to: Done }
        }
    }
}

pub fn routing() -> QueryMachine<(), Routing> {
    QueryMachine::new(())
}
