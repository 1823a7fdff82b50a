// Consistency Validator: proves the compiled artifacts agree on every shared token.
// Layout probing is optional and pluggable via the RenderProbe trait.

pub mod measure;
pub mod probe;
pub mod report;
pub mod validator;
