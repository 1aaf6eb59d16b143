mod descriptor;
mod serializer;

pub use descriptor::{
    Cursor, FilterOperator, OrderBy, OrderByType, OrderDirection, QueryDescriptor, ValueTag,
    WhereClause, WhereType,
};
pub use serializer::QuerySerializer;
