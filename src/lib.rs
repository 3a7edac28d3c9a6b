//! Catzilla's native core: the HTTP server, routing engine, streaming,
//! multipart upload pipeline, validation, dependency injection, cache, and
//! task engine that back a Catzilla application.
//!
//! This crate implements *only* the native core (see `spec.md` §1). The
//! scripting-language handler runtime, decorator sugar, packaging, and CLI
//! layers are explicitly out of scope and modelled here only as the narrow
//! callback surface the core exposes: [`handler::Handler`] /
//! [`responder::Responder`].
//!
//! # High-level features
//! - A radix/trie [`router`] with parameter extraction, method sets,
//!   per-route and per-group middleware chains, and deterministic
//!   "most specific wins" matching.
//! - Extractor-based handlers ([`extractors`]) with Axum-like ergonomics.
//! - A [`stream`]ing response path with chunked transfer encoding and
//!   backpressure.
//! - A zero-copy [`extractors::multipart`] upload pipeline with disk and
//!   memory sinks.
//! - A compiled [`validation`] engine for request bodies and parameters.
//! - A scoped [`di`] (dependency injection) container.
//! - An in-process hash + LRU [`cache`] engine.
//! - A priority-queue [`task`] engine with an auto-scaling worker pool.
//! - Typed [`arena`] allocation and [`platform`] primitives underpinning
//!   all of the above.
//!
//! # Compatibility
//! - Runtime: `tokio`
//! - HTTP: `hyper` 1.x
//!
//! # Quickstart
//!
//! ```rust
//! use catzilla_core::{Method, router::Router, responder::Responder, types::Request};
//!
//! async fn hello(_: Request) -> impl Responder { "Hello, World!" }
//!
//! let mut router = Router::new();
//! router.route(Method::GET, "/", hello);
//! ```

/// Typed arena allocation backing the hot paths of the native core (§4.9).
pub mod arena;

/// HTTP request and response body handling utilities.
pub mod body;

/// Smart cache engine: hash table, LRU, TTL, and stats (§4.7).
pub mod cache;

/// Runtime configuration surface (§6).
pub mod config;

/// Dependency injection container with scoped resolution (§4.6).
pub mod di;

/// Crate-wide error taxonomy (§7).
pub mod error;

/// Request data extraction utilities for parsing query params, JSON, and more.
pub mod extractors;

/// Request handler traits and implementations.
mod handler;

/// Middleware for processing requests and responses in a pipeline.
pub mod middleware;

/// Response generation utilities and traits.
pub mod responder;

/// Route definition and path-pattern segmentation.
mod route;

/// Request routing and dispatch functionality.
pub mod router;

/// HTTP server implementation and configuration.
mod server;

/// Application state management (process-wide singleton store).
pub mod state;

/// Streaming response path: chunked encoding with backpressure (§4.3).
pub mod stream;

/// Background task engine: priority queues and an auto-scaling worker pool (§4.8).
pub mod task;

/// Structured tracing setup for the native core's logging surface.
pub mod tracing;

/// Core type definitions used throughout the framework.
pub mod types;

/// Multipart upload pipeline sinks (§4.4).
pub mod upload;

/// Compiled validation engine for request bodies and parameters (§4.5).
pub mod validation;

pub use bytes::Bytes;
pub use http::{Method, StatusCode, header};
pub use http_body_util::Full;

/// Starts the HTTP server with the given listener and router.
///
/// This is the main entry point for starting a Catzilla server. The function
/// takes ownership of a TCP listener and router, then serves incoming
/// connections until the process is terminated.
///
/// # Examples
///
/// ```rust,no_run
/// use catzilla_core::{serve, router::Router};
/// use tokio::net::TcpListener;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let listener = TcpListener::bind("127.0.0.1:8080").await?;
/// let router = Router::new();
/// serve(listener, router).await;
/// # Ok(())
/// # }
/// ```
pub use server::serve;

/// Starts the HTTP server with an explicit [`config::Config`], applying its
/// header/body limits and initializing tracing (§6, §9 "Global mutable
/// state": `init`/`shutdown` lifecycle).
pub use server::serve_with_config;
