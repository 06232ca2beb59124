use crate::{
    archive::ArchiveError, catalog::CatalogError, config::ConfigError, field::FieldError,
    pipeline::RequestError, reducer::ReducerError, resolver::ResolverError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `field` module")]
    Field(#[from] FieldError),
    #[error("Error in the `catalog` module")]
    Catalog(#[from] CatalogError),
    #[error("Error in the `config` module")]
    Config(#[from] ConfigError),
    #[error("Error in the `resolver` module")]
    Resolver(#[from] ResolverError),
    #[error("Error in the `reducer` module")]
    Reducer(#[from] ReducerError),
    #[error("Error in the `archive` module")]
    Archive(#[from] ArchiveError),
    #[error("invalid pipeline request")]
    Request(#[from] RequestError),
}
pub type Result<T> = std::result::Result<T, Error>;
