//! # maven-stubgen
//!
//! Python type stubs for Java libraries, straight from Maven coordinates.
//!
//! ## Architecture
//!
//! - **coordinate**: Maven coordinate parsing
//! - **maven**: `mvn` discovery/installation and classpath resolution
//! - **jar**: Memory-mapped jar reading
//! - **classfile**: Class-file parser
//! - **signature**: Descriptor and generic signature grammar
//! - **model**: Public API model of a class, assembled per package
//! - **javadoc**: Docstrings from `-sources.jar` files using tree-sitter
//! - **pytypes**: Java to Python type mapping
//! - **render**: `.pyi` module text
//! - **scan**: Prefix discovery, package selection, output scanning
//! - **cache**: Persistent model cache using heed (LMDB)
//! - **generate**: Orchestration and the `pyproject.toml` build hook
//! - **ruff**: Optional formatter pass

pub mod cache;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod coordinate;
pub mod generate;
pub mod jar;
pub mod javadoc;
pub mod maven;
pub mod model;
pub mod pytypes;
pub mod render;
pub mod ruff;
pub mod scan;
pub mod signature;
