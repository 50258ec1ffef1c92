// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! SQL text for the Extractor/IdMapper/Denormalizer queries. Every `{..}`
//! substitution here comes from a closed enum (`SourceTable`,
//! `TimestampField`, `ForwardColumn`, `JoinTable`, `JoinColumn`), never
//! from caller-supplied text, so building these with `format!` carries no
//! injection risk despite the queries being per-pipeline rather than
//! compiled once with `diesel`'s query builder.

use super::{ExtractRequest, JoinRequest};

/// The composite `(ts, id)` cursor predicate: a naive `ts > :ts` would
/// drop every row sharing a timestamp with the watermark, and `ts >= :ts`
/// would replay the watermark row forever.
pub fn extract_query(req: &ExtractRequest) -> String {
    format!(
        "SELECT id, {ts_field}, {fwd_col} AS forward_id \
         FROM {table} \
         WHERE ({ts_field} = $1 AND id > $2) OR {ts_field} > $1 \
         ORDER BY {ts_field}, id \
         LIMIT $3",
        table = req.table.as_str(),
        ts_field = req.timestamp_field.as_str(),
        fwd_col = req.forward_column.as_str(),
    )
}

pub fn join_query(req: &JoinRequest) -> String {
    format!(
        "SELECT t.{select_field} AS id \
         FROM {join_table} t \
         WHERE t.{join_field} = ANY($1) \
         GROUP BY t.{select_field}",
        select_field = req.select_field.as_str(),
        join_table = req.join_table.as_str(),
        join_field = req.join_field.as_str(),
    )
}

/// One round trip per batch via `LEFT JOIN LATERAL` + `array_agg`, instead
/// of an O(N) follow-up query per id.
pub const DENORMALIZE_MOVIES: &str = r#"
    SELECT
        fw.id AS id,
        fw.title,
        fw.description,
        fw.rating,
        fwp.persons,
        fwg.genres
    FROM film_work fw
    LEFT JOIN LATERAL (
        SELECT array_agg(jsonb_build_object(
            'id', p.id,
            'full_name', p.full_name,
            'role', pfw.role
        )) AS persons
        FROM person_film_work pfw
        JOIN person p ON p.id = pfw.person_id
        WHERE pfw.film_work_id = fw.id
    ) fwp ON TRUE
    LEFT JOIN LATERAL (
        SELECT array_agg(jsonb_build_object(
            'id', g.id,
            'name', g.name
        )) AS genres
        FROM genre_film_work gfw
        JOIN genre g ON g.id = gfw.genre_id
        WHERE gfw.film_work_id = fw.id
    ) fwg ON TRUE
    WHERE fw.id = ANY($1)
"#;

pub const DENORMALIZE_PERSONS: &str = r#"
    SELECT
        p.id AS id,
        p.full_name,
        fwp.films
    FROM person p
    LEFT JOIN LATERAL (
        SELECT array_agg(jsonb_build_object(
            'film_work_id', pfw.film_work_id,
            'role', pfw.role
        )) AS films
        FROM person_film_work pfw
        WHERE pfw.person_id = p.id
    ) fwp ON TRUE
    WHERE p.id = ANY($1)
"#;

pub const DENORMALIZE_GENRES: &str = r#"
    SELECT
        g.id AS id,
        g.name,
        fwg.filmworks
    FROM genre g
    LEFT JOIN LATERAL (
        SELECT array_agg(jsonb_build_object(
            'id', fw.id,
            'title', fw.title,
            'rating', fw.rating
        )) AS filmworks
        FROM genre_film_work gfw
        JOIN film_work fw ON fw.id = gfw.film_work_id
        WHERE gfw.genre_id = g.id
    ) fwg ON TRUE
    WHERE g.id = ANY($1)
"#;
