// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

mod json_repair_test;
mod list_parser_test;
mod position_invariants_test;
