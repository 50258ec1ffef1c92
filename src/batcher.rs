// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pure chunking of a document list into bulk-sized groups.

pub fn batches<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = size.max(1);
    let mut out = Vec::with_capacity(items.len() / size + 1);
    let mut chunk = Vec::with_capacity(size);
    for item in items {
        chunk.push(item);
        if chunk.len() == size {
            out.push(std::mem::replace(&mut chunk, Vec::with_capacity(size)));
        }
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}
