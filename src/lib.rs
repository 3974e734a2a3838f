//! Virtual try-on gateway
//!
//! This library accepts a person photo and a garment photo, stages them for a
//! virtual try-on vendor (Kolors, Hugging Face Space or Fal.ai), submits a
//! generation job and polls it to completion. Generated images can be scored
//! for outfit fit through a Cloudflare Workers AI multimodal model.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
