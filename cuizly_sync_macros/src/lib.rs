mod table_row;

use proc_macro::TokenStream;

/// Derive macro for the `TableRow` trait.
///
/// Maps a serde-serializable record onto a remote table so it can be read
/// and written through `TypedTable`.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone, TableRow)]
/// #[row(table = "favorites")]
/// struct Favorite {
///     #[row(id)]
///     pub id: String,
///     pub user_id: String,
///     pub restaurant_id: String,
/// }
/// ```
///
/// - `#[row(table = "...")]` sets the table name. Defaults to the snake_case
///   struct name with an `s` suffix.
/// - `#[row(id)]` marks the primary key field. Defaults to a field named `id`.
#[proc_macro_derive(TableRow, attributes(row))]
pub fn derive_table_row(input: TokenStream) -> TokenStream {
    table_row::derive_table_row(input)
}
