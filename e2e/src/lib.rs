//! End-to-end scenarios for the Retrovault workspace, run against the
//! in-process testnet.

#[cfg(test)]
mod tests;
