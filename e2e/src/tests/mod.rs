mod catalog;
mod fetch;
mod publish;
mod transport;
mod utils;
