use crate::config::ConfigError;
use crate::observability::ObservabilityError;
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use table_store::{AzureTableStore, StoreError, TableStore, azure::DEFAULT_TIMEOUT};
use upsert::{FieldUpdate, MAX_FIELDS, RequestError, UpdateRequest, UpsertError, resolve};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "pipeline-storage", about = "Record pipeline state in Azure Table storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

impl Cli {
    /// Parses the command line, exiting with a usage error when `update`
    /// gets an odd number of field values or too many pairs.
    pub fn parse_checked() -> Self {
        let cli = Cli::parse();
        if let Err(e) = cli.check_field_pairs() {
            e.exit();
        }
        cli
    }

    fn check_field_pairs(&self) -> Result<(), clap::Error> {
        let CliCommand::Update(args) = &self.command else {
            return Ok(());
        };

        let mut command = Cli::command();
        if args.fields.len() % 2 != 0 {
            let unpaired = args.fields.last().map(String::as_str).unwrap_or_default();
            return Err(command.error(
                ErrorKind::WrongNumberOfValues,
                format!("field {unpaired} has no value"),
            ));
        }

        let pairs = args.fields.len() / 2;
        if pairs > MAX_FIELDS {
            return Err(command.error(
                ErrorKind::TooManyValues,
                format!("at most {MAX_FIELDS} field pairs can be set, got {pairs}"),
            ));
        }

        Ok(())
    }
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the HTTP trigger
    Serve {
        #[arg(long)]
        config_file: PathBuf,
    },
    /// Update the first row matching a filter, or insert a new one
    Update(UpdateArgs),
    /// Print every row of a table
    List(StoreArgs),
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    pub account_name: String,
    pub account_key: String,
    pub table_name: String,
    /// Table service endpoint, instead of the account's public endpoint
    #[arg(long)]
    pub table_endpoint: Option<Url>,
}

impl StoreArgs {
    fn connect(&self) -> Result<AzureTableStore, StoreError> {
        AzureTableStore::new(
            &self.account_name,
            &self.account_key,
            self.table_endpoint.as_ref(),
            DEFAULT_TIMEOUT,
        )
    }
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    pub partition_key: String,
    pub filter_name: String,
    pub filter_value: String,
    /// Field name and value pairs to set, at most five pairs
    #[arg(value_name = "NAME VALUE", num_args = 2.., required = true)]
    pub fields: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error(transparent)]
    Upsert(#[from] UpsertError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("field {0} has no value")]
    UnpairedField(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Groups `name value name value ...` into field updates.
pub fn field_pairs(values: &[String]) -> Result<Vec<FieldUpdate>, CliError> {
    let chunks = values.chunks_exact(2);
    if let [unpaired] = chunks.remainder() {
        return Err(CliError::UnpairedField(unpaired.clone()));
    }

    Ok(chunks
        .map(|pair| FieldUpdate::new(pair[0].as_str(), pair[1].as_str()))
        .collect())
}

pub async fn update(args: UpdateArgs) -> Result<(), CliError> {
    let request = UpdateRequest::new(
        args.filter_name,
        args.filter_value,
        field_pairs(&args.fields)?,
    )?;
    let store = args.store.connect()?;

    update_rows(
        &store,
        &args.store.table_name,
        &args.partition_key,
        &request,
        &mut std::io::stdout().lock(),
    )
    .await
}

pub async fn list(args: StoreArgs) -> Result<(), CliError> {
    let store = args.connect()?;
    list_rows(&store, &args.table_name, &mut std::io::stdout().lock()).await
}

async fn update_rows<S, W>(
    store: &S,
    table: &str,
    partition_key: &str,
    request: &UpdateRequest,
    out: &mut W,
) -> Result<(), CliError>
where
    S: TableStore + ?Sized,
    W: Write,
{
    let outcome = resolve(store, table, partition_key, request).await?;
    writeln!(out, "{}", outcome.row())?;
    writeln!(out, "Done")?;
    Ok(())
}

async fn list_rows<S, W>(store: &S, table: &str, out: &mut W) -> Result<(), CliError>
where
    S: TableStore + ?Sized,
    W: Write,
{
    for row in store.query(table, None, None).await? {
        writeln!(out, "{row}")?;
    }
    Ok(())
}
