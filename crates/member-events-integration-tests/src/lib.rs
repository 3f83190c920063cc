//! Integration tests for the member events worker live under `tests/`.
