//! Compat code, ported or planned for an upcoming release of ``burn``.
pub mod normalization_wrapper;
