//! Integration tests for Layer 0: Foundation
//!
//! Tests core values, object handles, and the fault taxonomy.
