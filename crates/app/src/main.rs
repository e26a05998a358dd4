use std::error::Error;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    AddMemberCmd, Engine, EngineError, Expense, ExpenseCategory, MoneyCents, NewExpenseCmd,
    NewGroupCmd, SettleCmd, SplitPolicy, SplitRequest, SplitType, UpdateExpenseCmd,
    UpdateGroupCmd,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use uuid::Uuid;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "splitledger")]
#[command(about = "Track shared expenses and who owes whom")]
struct Cli {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Database connection string (also read from `DATABASE_URL`).
    /// Takes precedence over the configured database.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Group(GroupArgs),
    Member(MemberArgs),
    Expense(ExpenseArgs),
    /// Record a payment between two members.
    Settle(SettleArgs),
    /// Show every member's balance in a group.
    Balances(GroupRef),
    /// Show a user's position across all groups.
    Summary(SummaryArgs),
    /// Show the latest activity of a group.
    Activity(ActivityArgs),
    /// Check stored balances against the group's expenses.
    Verify(GroupRef),
}

#[derive(Args, Debug)]
struct GroupArgs {
    #[command(subcommand)]
    command: GroupCommand,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    Create(GroupCreateArgs),
    /// Rename a group or change its category or description. An empty
    /// value clears the category or description.
    Update(GroupUpdateArgs),
    Show(GroupRef),
    Delete(GroupRef),
}

#[derive(Args, Debug)]
struct GroupCreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct GroupUpdateArgs {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct GroupRef {
    #[arg(long)]
    group: Uuid,
}

#[derive(Args, Debug)]
struct MemberArgs {
    #[command(subcommand)]
    command: MemberCommand,
}

#[derive(Subcommand, Debug)]
enum MemberCommand {
    Add(MemberAddArgs),
    Remove(MemberRemoveArgs),
}

#[derive(Args, Debug)]
struct MemberAddArgs {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    user: String,
    #[arg(long)]
    name: String,
}

#[derive(Args, Debug)]
struct MemberRemoveArgs {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    member: Uuid,
}

#[derive(Args, Debug)]
struct ExpenseArgs {
    #[command(subcommand)]
    command: ExpenseCommand,
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    Add(ExpenseAddArgs),
    Update(ExpenseUpdateArgs),
    Delete(ExpenseRef),
    List(ExpenseListArgs),
}

/// Split input: one `--participant` per member, and for non-equal splits one
/// `--value` per participant in the same order.
#[derive(Args, Debug)]
struct SplitArgs {
    /// equal, percentage, exact or shares.
    #[arg(long = "split")]
    split_type: Option<String>,
    #[arg(long = "participant")]
    participants: Vec<Uuid>,
    #[arg(long = "value")]
    values: Vec<String>,
}

impl SplitArgs {
    fn is_empty(&self) -> bool {
        self.split_type.is_none() && self.participants.is_empty() && self.values.is_empty()
    }

    fn request(&self) -> Result<SplitRequest, EngineError> {
        let split_type = match self.split_type.as_deref() {
            Some(raw) => SplitType::try_from(raw)?,
            None => SplitType::Equal,
        };
        let values: Vec<&str> = self.values.iter().map(String::as_str).collect();
        let policy = SplitPolicy::from_input(split_type, &values)?;
        Ok(SplitRequest::new(policy, self.participants.clone()))
    }
}

#[derive(Args, Debug)]
struct ExpenseAddArgs {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    title: String,
    /// Amount as a decimal string, e.g. `12.50`.
    #[arg(long)]
    amount: MoneyCents,
    /// Member that paid.
    #[arg(long)]
    paid_by: Uuid,
    #[command(flatten)]
    split: SplitArgs,
    #[arg(long)]
    category: Option<String>,
    /// RFC 3339 timestamp; defaults to now.
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args, Debug)]
struct ExpenseUpdateArgs {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    expense: Uuid,
    /// Revision the update is based on.
    #[arg(long)]
    revision: Option<u32>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    amount: Option<MoneyCents>,
    #[arg(long)]
    paid_by: Option<Uuid>,
    #[command(flatten)]
    split: SplitArgs,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long, conflicts_with = "notes")]
    clear_notes: bool,
}

#[derive(Args, Debug)]
struct ExpenseRef {
    #[arg(long)]
    group: Uuid,
    #[arg(long)]
    expense: Uuid,
}

#[derive(Args, Debug)]
struct ExpenseListArgs {
    #[arg(long)]
    group: Uuid,
    /// Include deleted expenses.
    #[arg(long)]
    all: bool,
}

#[derive(Args, Debug)]
struct SettleArgs {
    #[arg(long)]
    group: Uuid,
    /// Member paying.
    #[arg(long)]
    from: Uuid,
    /// Member receiving.
    #[arg(long)]
    to: Uuid,
    #[arg(long)]
    amount: MoneyCents,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args, Debug)]
struct SummaryArgs {
    #[arg(long)]
    user: String,
}

#[derive(Args, Debug)]
struct ActivityArgs {
    #[arg(long)]
    group: Uuid,
    #[arg(long, default_value_t = 20)]
    limit: u64,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let database = sea_orm::Database::connect(database_url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}

fn print<T: Serialize>(
    json: bool,
    value: &T,
    human: impl FnOnce(&T),
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_expense(expense: &Expense) {
    println!(
        "{}  {}  {}  {}  [{}] rev {}  {}",
        expense.id,
        expense.date.format("%Y-%m-%d"),
        expense.title,
        expense.amount,
        expense.split_type,
        expense.revision,
        expense.status.as_str()
    );
    for split in &expense.splits {
        let marker = if split.is_payer { " (paid)" } else { "" };
        println!("    {}  {}{marker}", split.member_id, split.amount);
    }
}

async fn run(
    engine: &Engine,
    command: Command,
    json: bool,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        Command::Group(GroupArgs { command }) => match command {
            GroupCommand::Create(args) => {
                let mut cmd = NewGroupCmd::new(args.name);
                if let Some(category) = args.category {
                    cmd = cmd.category(category);
                }
                if let Some(description) = args.description {
                    cmd = cmd.description(description);
                }
                let group = engine.create_group(cmd).await?;
                print(json, &group, |g| println!("created group {}: {}", g.id, g.name))?;
            }
            GroupCommand::Update(args) => {
                let mut cmd = UpdateGroupCmd::new(args.group);
                cmd.name = args.name;
                cmd.category = args.category;
                cmd.description = args.description;
                let group = engine.update_group(cmd).await?;
                print(json, &group, |g| println!("updated group {}: {}", g.id, g.name))?;
            }
            GroupCommand::Show(GroupRef { group }) => {
                let group = engine.group(group).await?;
                let members = engine.members(group.id).await?;
                print(json, &(&group, &members), |(g, members)| {
                    println!("{} ({})", g.name, g.id);
                    if let Some(description) = &g.description {
                        println!("{description}");
                    }
                    for m in members.iter() {
                        println!("  {}  {} <{}>", m.id, m.display_name, m.user_id);
                    }
                })?;
            }
            GroupCommand::Delete(GroupRef { group }) => {
                engine.delete_group(group).await?;
                println!("deleted group {group}");
            }
        },
        Command::Member(MemberArgs { command }) => match command {
            MemberCommand::Add(args) => {
                let member = engine
                    .add_member(AddMemberCmd::new(args.group, args.user, args.name))
                    .await?;
                print(json, &member, |m| {
                    println!("added {} as member {}", m.display_name, m.id)
                })?;
            }
            MemberCommand::Remove(args) => {
                engine.remove_member(args.group, args.member).await?;
                println!("removed member {}", args.member);
            }
        },
        Command::Expense(ExpenseArgs { command }) => match command {
            ExpenseCommand::Add(args) => {
                let mut cmd = NewExpenseCmd::new(
                    args.group,
                    args.title,
                    args.amount,
                    args.paid_by,
                    args.split.request()?,
                );
                if let Some(category) = args.category.as_deref() {
                    cmd = cmd.category(ExpenseCategory::try_from(category)?);
                }
                if let Some(date) = args.date {
                    cmd = cmd.date(date);
                }
                if let Some(notes) = args.notes {
                    cmd = cmd.notes(notes);
                }
                let expense = engine.create_expense(cmd).await?;
                print(json, &expense, print_expense)?;
            }
            ExpenseCommand::Update(args) => {
                let mut cmd = UpdateExpenseCmd::new(args.group, args.expense);
                if let Some(revision) = args.revision {
                    cmd = cmd.expected_revision(revision);
                }
                if let Some(title) = args.title {
                    cmd = cmd.title(title);
                }
                if let Some(amount) = args.amount {
                    cmd = cmd.amount(amount);
                }
                if let Some(paid_by) = args.paid_by {
                    cmd = cmd.paid_by(paid_by);
                }
                if !args.split.is_empty() {
                    cmd = cmd.split(args.split.request()?);
                }
                if let Some(category) = args.category.as_deref() {
                    cmd = cmd.category(ExpenseCategory::try_from(category)?);
                }
                if let Some(date) = args.date {
                    cmd = cmd.date(date);
                }
                if let Some(notes) = args.notes {
                    cmd = cmd.notes(notes);
                }
                if args.clear_notes {
                    cmd = cmd.clear_notes();
                }
                let expense = engine.update_expense(cmd).await?;
                print(json, &expense, print_expense)?;
            }
            ExpenseCommand::Delete(args) => {
                let expense = engine.delete_expense(args.group, args.expense).await?;
                print(json, &expense, |e| println!("deleted \"{}\"", e.title))?;
            }
            ExpenseCommand::List(args) => {
                let expenses = engine.group_expenses(args.group, args.all).await?;
                print(json, &expenses, |expenses| {
                    for expense in expenses.iter() {
                        print_expense(expense);
                    }
                })?;
            }
        },
        Command::Settle(args) => {
            let mut cmd = SettleCmd::new(args.group, args.from, args.to, args.amount);
            if let Some(notes) = args.notes {
                cmd = cmd.notes(notes);
            }
            let settlement = engine.settle(cmd).await?;
            print(json, &settlement, print_expense)?;
        }
        Command::Balances(GroupRef { group }) => {
            let members = engine.group_balances(group).await?;
            print(json, &members, |members| {
                for m in members.iter() {
                    println!("{:<24} {:>12}", m.display_name, m.balance.signed().to_string());
                }
            })?;
        }
        Command::Summary(args) => {
            let summary = engine.user_summary(&args.user).await?;
            print(json, &summary, |s| {
                println!("total        {}", s.total.signed());
                println!("owed to you  {}", s.owed_to_you);
                println!("you owe      {}", s.you_owe);
            })?;
        }
        Command::Activity(args) => {
            let feed = engine.group_activity(args.group, args.limit).await?;
            print(json, &feed, |feed| {
                for activity in feed.iter() {
                    println!(
                        "{}  {}",
                        activity.created_at.format("%Y-%m-%d %H:%M"),
                        activity.message
                    );
                }
            })?;
        }
        Command::Verify(GroupRef { group }) => {
            engine.verify_group(group).await?;
            println!("group {group} is consistent");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "splitledger={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let database_url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    let db = connect_db(&database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    if let Err(err) = run(&engine, cli.command, cli.json).await {
        match err.downcast_ref::<EngineError>() {
            Some(engine_err) => {
                tracing::error!("{engine_err}");
                eprintln!("error: {}", engine_err.user_message());
            }
            None => eprintln!("error: {err}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
