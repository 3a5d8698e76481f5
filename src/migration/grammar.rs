//! Grammar of `Schema::…` migration statements.

use crate::automaton::{Automaton, Grammar, GrammarError, Symbol};

use super::lexer::TokenKind;

/// Production tags handed to the interpreter on each reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    Definition,
    CreateTable,
    ModifyTable,
    DropTable,
    Lines,
    Line,
    /// A line whose only call was an ignored one, e.g. `$table->index(...)`.
    EmptyLine,
    Column,
    Nameless,
    ModifierCall,
    Foreign,
    ForeignLocated,
    ForeignId,
    ForeignIdLocated,
    DropColumn,
    DropForeign,
    Columns,
    Texts,
    Mods,
    Mod,
    Target,
    Located,
    Args,
    Arg,
    Values,
    Value,
}

pub fn build() -> Result<Automaton<TokenKind, Production>, GrammarError> {
    use Symbol::{N, T};
    use TokenKind::*;

    let mut g = Grammar::new();

    // One level per keyword family, all nonassoc: none of them may chain.
    g.nonassoc(&[Type])
        .nonassoc(&[Nameless])
        .nonassoc(&[End])
        .nonassoc(&[TableVar])
        .nonassoc(&[Foreign, ForeignId]);

    let frame = |action: TokenKind, named: bool| -> Vec<Symbol<TokenKind>> {
        let mut rhs = vec![
            T(Facade),
            T(DoubleColon),
            T(action),
            T(LParen),
            T(Text),
            T(Comma),
            T(Function),
            T(LParen),
        ];
        if named {
            rhs.push(T(Word));
        }
        rhs.extend([T(TableVar), T(RParen)]);
        rhs
    };

    g.rule(
        "Definition",
        &[N("Open"), T(LBrace), N("Lines"), T(RBrace), T(RParen), T(End)],
        Production::Definition,
    )
    .rule(
        "Definition",
        &[N("Open"), T(LBrace), T(RBrace), T(RParen), T(End)],
        Production::Definition,
    )
    .rule(
        "Definition",
        &[
            T(Facade),
            T(DoubleColon),
            T(Drop),
            T(LParen),
            T(Text),
            T(RParen),
            T(End),
        ],
        Production::DropTable,
    )
    .rule("Open", &frame(Create, true), Production::CreateTable)
    .rule("Open", &frame(Create, false), Production::CreateTable)
    .rule("Open", &frame(Modify, true), Production::ModifyTable)
    .rule("Open", &frame(Modify, false), Production::ModifyTable);

    g.rule("Lines", &[N("Line")], Production::Lines)
        .rule("Lines", &[N("Lines"), N("Line")], Production::Lines)
        .rule(
            "Line",
            &[T(TableVar), T(Arrow), N("Call"), T(End)],
            Production::Line,
        )
        .rule("Line", &[T(TableVar), T(End)], Production::EmptyLine);

    // Typed columns, with optional extra arguments and chained modifiers.
    let column = [T(Type), T(LParen), T(Text)];
    for tail in [
        &[T(RParen)][..],
        &[T(RParen), N("Mods")][..],
        &[T(Comma), N("Args"), T(RParen)][..],
        &[T(Comma), N("Args"), T(RParen), N("Mods")][..],
    ] {
        g.rule("Call", &[&column[..], tail].concat(), Production::Column);
    }

    g.rule("Call", &[T(Nameless), T(LParen), T(RParen)], Production::Nameless)
        .rule(
            "Call",
            &[T(Nameless), T(LParen), T(RParen), N("Mods")],
            Production::Nameless,
        )
        .rule(
            "Call",
            &[T(Modifier), T(LParen), N("Columns"), T(RParen)],
            Production::ModifierCall,
        );

    // Foreign keys.
    let foreign = [T(Foreign), T(LParen), N("Columns"), T(RParen)];
    g.rule("Call", &foreign, Production::Foreign)
        .rule("Call", &[&foreign[..], &[N("Mods")][..]].concat(), Production::Foreign)
        .rule(
            "Call",
            &[&foreign[..], &[N("Located")][..]].concat(),
            Production::ForeignLocated,
        );

    let foreign_id = [T(ForeignId), T(LParen), T(Text), T(RParen)];
    g.rule("Call", &foreign_id, Production::ForeignId)
        .rule(
            "Call",
            &[&foreign_id[..], &[N("Mods")][..]].concat(),
            Production::ForeignId,
        )
        .rule(
            "Call",
            &[&foreign_id[..], &[N("Located")][..]].concat(),
            Production::ForeignIdLocated,
        )
        .rule(
            "Call",
            &[&foreign_id[..], &[N("Mods"), N("Located")][..]].concat(),
            Production::ForeignIdLocated,
        );

    g.rule(
        "Call",
        &[T(DropColumn), T(LParen), N("Columns"), T(RParen)],
        Production::DropColumn,
    )
    .rule(
        "Call",
        &[T(DropForeign), T(LParen), N("Columns"), T(RParen)],
        Production::DropForeign,
    );

    g.rule("Located", &[N("Target"), N("Target")], Production::Located)
        .rule(
            "Target",
            &[T(Arrow), T(Location), T(LParen), N("Columns"), T(RParen)],
            Production::Target,
        );

    g.rule("Mods", &[N("Mod")], Production::Mods)
        .rule("Mods", &[N("Mods"), N("Mod")], Production::Mods)
        .rule(
            "Mod",
            &[T(Arrow), T(Modifier), T(LParen), T(RParen)],
            Production::Mod,
        );

    g.rule("Columns", &[T(Text)], Production::Columns)
        .rule(
            "Columns",
            &[T(LBracket), N("Texts"), T(RBracket)],
            Production::Columns,
        )
        .rule("Texts", &[T(Text)], Production::Texts)
        .rule("Texts", &[N("Texts"), T(Comma), T(Text)], Production::Texts)
        .rule("Texts", &[N("Texts"), T(Comma)], Production::Texts);

    g.rule("Args", &[N("Arg")], Production::Args)
        .rule("Args", &[N("Args"), T(Comma), N("Arg")], Production::Args)
        .rule("Arg", &[N("Value")], Production::Arg)
        .rule("Arg", &[T(LBracket), N("Values"), T(RBracket)], Production::Arg)
        .rule("Arg", &[T(LBracket), T(RBracket)], Production::Arg)
        .rule("Values", &[N("Value")], Production::Values)
        .rule("Values", &[N("Values"), T(Comma), N("Value")], Production::Values)
        .rule("Values", &[N("Values"), T(Comma)], Production::Values)
        .rule("Value", &[T(Text)], Production::Value)
        .rule("Value", &[T(Number)], Production::Value)
        .rule("Value", &[T(Word)], Production::Value);

    g.build("Definition")
}
