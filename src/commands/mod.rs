// ABOUTME: Command handlers for the rolling-replacer CLI.
// ABOUTME: A single run command drives one strategy end to end.

mod run;

pub use run::run;
