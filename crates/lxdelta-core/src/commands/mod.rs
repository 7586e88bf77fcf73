pub mod backup;
pub mod inspect;
