//! End-to-end scenarios driven through the dispatcher with real signatures.

#[cfg(test)]
mod auth_flow;
#[cfg(test)]
mod ledger_flow;
#[cfg(test)]
mod relay;
