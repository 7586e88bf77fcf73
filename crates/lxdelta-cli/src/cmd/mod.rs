pub(crate) mod backup;
pub(crate) mod diff;
pub(crate) mod fingerprint;
