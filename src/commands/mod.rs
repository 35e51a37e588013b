//! Command handlers. Each returns the text printed on success.
//!
//! Role checks happen when a handler asks the context for a client, so
//! commands that never touch the API (config, status, logout) work offline.

pub mod admin;
pub mod auth;
pub mod config;
pub mod groups;
pub mod orders;
pub mod reports;
pub mod slips;

use crate::cli::{
    CategoryAction, Command, ConfigAction, CustomerAction, DishAction, GroupsAction,
    IngredientAction, OrderAction,
};
use crate::context::AppContext;

pub async fn run(command: Command, ctx: &mut AppContext) -> anyhow::Result<String> {
    match command {
        Command::Login { email, password } => auth::login(ctx, &email, &password).await,
        Command::Logout => auth::logout(ctx),
        Command::Whoami => Ok(auth::whoami(ctx)),
        Command::Status => auth::status(ctx),
        Command::Catalog => admin::catalog(ctx).await,

        Command::Category { action } => match action {
            CategoryAction::Add { name } => admin::add_category(ctx, &name).await,
            CategoryAction::Delete { id, force } => admin::delete_category(ctx, id, force).await,
        },
        Command::Ingredient { action } => match action {
            IngredientAction::Add { name, category } => {
                admin::add_ingredient(ctx, &name, category).await
            }
            IngredientAction::Delete { id } => admin::delete_ingredient(ctx, id).await,
        },
        Command::Customer { action } => match action {
            CustomerAction::Add {
                name,
                phone,
                email,
                address,
            } => {
                admin::add_customer(
                    ctx,
                    &name,
                    phone.as_deref(),
                    email.as_deref(),
                    address.as_deref(),
                )
                .await
            }
            CustomerAction::Delete { id } => admin::delete_customer(ctx, id).await,
        },
        Command::Dish { action } => match action {
            DishAction::Add {
                name,
                base_quantity,
                base_unit,
                price,
                cost,
                ingredients,
            } => {
                admin::add_dish(ctx, &name, base_quantity, &base_unit, price, cost, ingredients)
                    .await
            }
            DishAction::Delete { id } => admin::delete_dish(ctx, id).await,
        },

        Command::Preview {
            dish,
            quantity,
            overrides,
        } => orders::preview(ctx, dish, quantity, &overrides).await,
        Command::Order {
            action:
                OrderAction::Place {
                    dish,
                    customer,
                    quantity,
                    unit,
                    overrides,
                    details,
                },
        } => orders::place(ctx, dish, customer, quantity, unit, &overrides, details).await,
        Command::Checkout {
            customer,
            lines,
            details,
        } => orders::checkout(ctx, customer, lines, details).await,
        Command::Orders => orders::list(ctx).await,

        Command::Slip { kind } => slips::run(ctx, kind).await,
        Command::Reports { range } => reports::run(ctx, &range).await,

        Command::Config { action } => match action {
            ConfigAction::Get { key } => config::get(ctx, &key),
            ConfigAction::Set { key, value } => config::set(ctx, &key, &value),
            ConfigAction::Unset { key } => config::unset(ctx, &key),
            ConfigAction::List => Ok(config::list(ctx)),
        },
        Command::Groups { action } => match action {
            GroupsAction::List => Ok(groups::list(ctx)),
            GroupsAction::Clear => groups::clear(ctx),
            GroupsAction::Prune => Ok(groups::prune(ctx)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::path::PathBuf;

    fn ctx() -> AppContext {
        let db = crate::db::init_in_memory().expect("db");
        AppContext::with_store(PathBuf::from("/tmp/desk"), db, None, true)
    }

    async fn run_args(ctx: &mut AppContext, args: &[&str]) -> anyhow::Result<String> {
        let mut argv = vec!["catering-desk"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).expect("parse");
        run(cli.command, ctx).await
    }

    #[tokio::test]
    async fn api_commands_need_a_session() {
        let mut ctx = ctx();
        for args in [
            &["catalog"][..],
            &["orders"],
            &["category", "add", "Spices"],
            &["reports", "--range", "monthly"],
            &["slip", "group", "4"],
        ] {
            let err = run_args(&mut ctx, args).await.expect_err("not logged in");
            assert!(err.to_string().contains("Not logged in"), "{args:?}: {err}");
        }
    }

    #[tokio::test]
    async fn offline_commands_work_without_a_session() {
        let mut ctx = ctx();
        assert_eq!(run_args(&mut ctx, &["whoami"]).await.expect("whoami"), "Not logged in");
        assert!(run_args(&mut ctx, &["status"]).await.is_ok());
        assert!(run_args(&mut ctx, &["config", "list"]).await.is_ok());
        assert!(run_args(&mut ctx, &["groups", "list"]).await.is_ok());
        assert_eq!(run_args(&mut ctx, &["logout"]).await.expect("logout"), "Logged out");
    }
}
