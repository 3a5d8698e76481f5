//! SLR(1) table construction and a shift-reduce driver.
//!
//! A [`Grammar`] is a list of tagged productions over terminal kinds `T`.
//! [`Grammar::build`] compiles it once into an immutable [`Automaton`]; every
//! call to [`Automaton::parse`] keeps its own stack, so one automaton can
//! serve any number of parses.
//!
//! Shift/reduce conflicts are settled with yacc-style precedence: a
//! production takes the precedence of its rightmost declared terminal, and
//! levels declared later bind tighter. An equal-level `nonassoc` conflict
//! becomes an error entry, reported as [`DriveError::NonAssociative`].

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    NonAssoc,
}

/// A grammar symbol: a terminal kind or a named nonterminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol<T> {
    T(T),
    N(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("Start symbol '{0}' has no productions")]
    UndefinedStart(&'static str),
    #[error("Nonterminal '{0}' is used but has no productions")]
    UndefinedSymbol(&'static str),
}

/// A token handed to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme<T> {
    pub kind: T,
    pub text: String,
    pub offset: usize,
}

/// Why a parse stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveError<E> {
    /// The token source failed.
    Lex(E),
    /// No action for this token in the current state.
    Syntax { text: String, offset: usize },
    /// A `nonassoc` operator was chained.
    NonAssociative { text: String, offset: usize },
    /// The token kind is not a terminal of the grammar.
    UnknownToken { text: String, offset: usize },
}

/// Builds semantic values while the driver shifts and reduces.
pub trait Reducer<T, P> {
    type Value;

    fn shift(&mut self, lexeme: Lexeme<T>) -> Self::Value;

    /// Called with the values of the production's right-hand side, in order.
    fn reduce(&mut self, production: P, values: Vec<Self::Value>) -> Self::Value;
}

struct Rule<T, P> {
    lhs: &'static str,
    rhs: Vec<Symbol<T>>,
    tag: P,
}

pub struct Grammar<T, P> {
    rules: Vec<Rule<T, P>>,
    precedence: HashMap<T, (usize, Assoc)>,
    levels: usize,
}

impl<T, P> Default for Grammar<T, P> {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            precedence: HashMap::new(),
            levels: 0,
        }
    }
}

impl<T, P> Grammar<T, P>
where
    T: Copy + Eq + Hash + Debug,
    P: Copy + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn left(&mut self, terminals: &[T]) -> &mut Self {
        self.declare(terminals, Assoc::Left)
    }

    pub fn right(&mut self, terminals: &[T]) -> &mut Self {
        self.declare(terminals, Assoc::Right)
    }

    pub fn nonassoc(&mut self, terminals: &[T]) -> &mut Self {
        self.declare(terminals, Assoc::NonAssoc)
    }

    fn declare(&mut self, terminals: &[T], assoc: Assoc) -> &mut Self {
        self.levels += 1;
        for t in terminals {
            self.precedence.insert(*t, (self.levels, assoc));
        }
        self
    }

    pub fn rule(&mut self, lhs: &'static str, rhs: &[Symbol<T>], tag: P) -> &mut Self {
        self.rules.push(Rule {
            lhs,
            rhs: rhs.to_vec(),
            tag,
        });
        self
    }

    pub fn build(&self, start: &'static str) -> Result<Automaton<T, P>, GrammarError> {
        Builder::new(self, start)?.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Shift(usize),
    Reduce(usize),
    Accept,
    NonAssoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Sym {
    Term(usize),
    NonTerm(usize),
}

struct Production<P> {
    lhs: usize,
    rhs: Vec<Sym>,
    /// `None` only for the augmented start production.
    tag: Option<P>,
    precedence: Option<(usize, Assoc)>,
}

/// LR(0) item: production index and dot position.
type Item = (usize, usize);

struct Builder<'g, T, P> {
    grammar: &'g Grammar<T, P>,
    terminals: HashMap<T, usize>,
    terminal_precedence: Vec<Option<(usize, Assoc)>>,
    names: Vec<&'static str>,
    productions: Vec<Production<P>>,
    eof: usize,
}

impl<'g, T, P> Builder<'g, T, P>
where
    T: Copy + Eq + Hash + Debug,
    P: Copy + Debug,
{
    fn new(grammar: &'g Grammar<T, P>, start: &'static str) -> Result<Self, GrammarError> {
        let mut nonterminals: HashMap<&'static str, usize> = HashMap::new();
        // Index 0 is the augmented start symbol.
        let mut names = vec!["<start>"];
        for rule in &grammar.rules {
            if !nonterminals.contains_key(rule.lhs) {
                nonterminals.insert(rule.lhs, names.len());
                names.push(rule.lhs);
            }
        }
        let start_id = *nonterminals
            .get(start)
            .ok_or(GrammarError::UndefinedStart(start))?;

        let mut terminals: HashMap<T, usize> = HashMap::new();
        let mut terminal_precedence = Vec::new();
        let mut productions = vec![Production {
            lhs: 0,
            rhs: vec![Sym::NonTerm(start_id)],
            tag: None,
            precedence: None,
        }];

        for rule in &grammar.rules {
            let mut rhs = Vec::with_capacity(rule.rhs.len());
            let mut precedence = None;
            for symbol in &rule.rhs {
                match symbol {
                    Symbol::T(t) => {
                        let id = *terminals.entry(*t).or_insert_with(|| {
                            terminal_precedence.push(grammar.precedence.get(t).copied());
                            terminal_precedence.len() - 1
                        });
                        if let Some(p) = grammar.precedence.get(t) {
                            precedence = Some(*p);
                        }
                        rhs.push(Sym::Term(id));
                    }
                    Symbol::N(name) => {
                        let id = *nonterminals
                            .get(name)
                            .ok_or(GrammarError::UndefinedSymbol(*name))?;
                        rhs.push(Sym::NonTerm(id));
                    }
                }
            }
            productions.push(Production {
                lhs: nonterminals[rule.lhs],
                rhs,
                tag: Some(rule.tag),
                precedence,
            });
        }

        let eof = terminals.len();
        terminal_precedence.push(None);

        Ok(Self {
            grammar,
            terminals,
            terminal_precedence,
            names,
            productions,
            eof,
        })
    }

    fn nullable_and_first(&self) -> (Vec<bool>, Vec<BTreeSet<usize>>) {
        let n = self.names.len();
        let mut nullable = vec![false; n];
        let mut first = vec![BTreeSet::new(); n];

        let mut changed = true;
        while changed {
            changed = false;
            for prod in &self.productions {
                let mut all_nullable = true;
                for sym in &prod.rhs {
                    match *sym {
                        Sym::Term(t) => {
                            changed |= first[prod.lhs].insert(t);
                            all_nullable = false;
                        }
                        Sym::NonTerm(b) => {
                            let additions: Vec<usize> = first[b].iter().copied().collect();
                            for t in additions {
                                changed |= first[prod.lhs].insert(t);
                            }
                            if !nullable[b] {
                                all_nullable = false;
                            }
                        }
                    }
                    if !all_nullable {
                        break;
                    }
                }
                if all_nullable && !nullable[prod.lhs] {
                    nullable[prod.lhs] = true;
                    changed = true;
                }
            }
        }
        (nullable, first)
    }

    fn follow(&self, nullable: &[bool], first: &[BTreeSet<usize>]) -> Vec<BTreeSet<usize>> {
        let mut follow = vec![BTreeSet::new(); self.names.len()];
        follow[0].insert(self.eof);

        let mut changed = true;
        while changed {
            changed = false;
            for prod in &self.productions {
                for (i, sym) in prod.rhs.iter().enumerate() {
                    let Sym::NonTerm(b) = *sym else { continue };
                    let mut rest_nullable = true;
                    for next in &prod.rhs[i + 1..] {
                        match *next {
                            Sym::Term(t) => {
                                changed |= follow[b].insert(t);
                                rest_nullable = false;
                            }
                            Sym::NonTerm(c) => {
                                for t in first[c].clone() {
                                    changed |= follow[b].insert(t);
                                }
                                rest_nullable = nullable[c];
                            }
                        }
                        if !rest_nullable {
                            break;
                        }
                    }
                    if rest_nullable && b != prod.lhs {
                        for t in follow[prod.lhs].clone() {
                            changed |= follow[b].insert(t);
                        }
                    }
                }
            }
        }
        follow
    }

    fn closure(&self, kernel: Vec<Item>) -> Vec<Item> {
        let mut items: BTreeSet<Item> = kernel.into_iter().collect();
        let mut work: Vec<Item> = items.iter().copied().collect();
        while let Some((p, dot)) = work.pop() {
            if let Some(Sym::NonTerm(b)) = self.productions[p].rhs.get(dot) {
                for (q, prod) in self.productions.iter().enumerate() {
                    if prod.lhs == *b && items.insert((q, 0)) {
                        work.push((q, 0));
                    }
                }
            }
        }
        items.into_iter().collect()
    }

    fn build(self) -> Result<Automaton<T, P>, GrammarError> {
        let (nullable, first) = self.nullable_and_first();
        let follow = self.follow(&nullable, &first);

        let mut states: Vec<Vec<Item>> = vec![self.closure(vec![(0, 0)])];
        let mut index: HashMap<Vec<Item>, usize> = HashMap::new();
        index.insert(states[0].clone(), 0);
        let mut transitions: Vec<Vec<(Sym, usize)>> = Vec::new();

        let mut s = 0;
        while s < states.len() {
            let mut by_symbol: Vec<(Sym, Vec<Item>)> = Vec::new();
            for &(p, dot) in &states[s] {
                let Some(sym) = self.productions[p].rhs.get(dot) else { continue };
                match by_symbol.iter_mut().find(|(x, _)| x == sym) {
                    Some((_, kernel)) => kernel.push((p, dot + 1)),
                    None => by_symbol.push((*sym, vec![(p, dot + 1)])),
                }
            }

            let mut edges = Vec::with_capacity(by_symbol.len());
            for (sym, kernel) in by_symbol {
                let target = self.closure(kernel);
                let next = match index.get(&target) {
                    Some(&next) => next,
                    None => {
                        states.push(target.clone());
                        index.insert(target, states.len() - 1);
                        states.len() - 1
                    }
                };
                edges.push((sym, next));
            }
            transitions.push(edges);
            s += 1;
        }

        let mut action: Vec<HashMap<usize, Action>> = vec![HashMap::new(); states.len()];
        let mut goto: Vec<HashMap<usize, usize>> = vec![HashMap::new(); states.len()];

        for (s, edges) in transitions.iter().enumerate() {
            for &(sym, next) in edges {
                match sym {
                    Sym::Term(t) => {
                        action[s].insert(t, Action::Shift(next));
                    }
                    Sym::NonTerm(n) => {
                        goto[s].insert(n, next);
                    }
                }
            }
        }

        for (s, items) in states.iter().enumerate() {
            for &(p, dot) in items {
                let prod = &self.productions[p];
                if dot < prod.rhs.len() {
                    continue;
                }
                if p == 0 {
                    action[s].insert(self.eof, Action::Accept);
                    continue;
                }
                for &t in &follow[prod.lhs] {
                    self.place_reduce(&mut action[s], s, t, p);
                }
            }
        }

        tracing::debug!(
            states = states.len(),
            productions = self.productions.len(),
            "grammar compiled"
        );

        Ok(Automaton {
            terminals: self.terminals,
            eof: self.eof,
            action,
            goto,
            productions: self
                .productions
                .into_iter()
                .map(|p| (p.lhs, p.rhs.len(), p.tag))
                .collect(),
        })
    }

    fn place_reduce(&self, row: &mut HashMap<usize, Action>, state: usize, t: usize, p: usize) {
        let resolved = match row.get(&t).copied() {
            None => Action::Reduce(p),
            Some(Action::Shift(next)) => {
                let rule = self.productions[p].precedence;
                let token = self.terminal_precedence[t];
                match (rule, token) {
                    (Some((rule_level, _)), Some((token_level, assoc))) => {
                        if rule_level > token_level {
                            Action::Reduce(p)
                        } else if rule_level < token_level {
                            Action::Shift(next)
                        } else {
                            match assoc {
                                Assoc::Left => Action::Reduce(p),
                                Assoc::Right => Action::Shift(next),
                                Assoc::NonAssoc => Action::NonAssoc,
                            }
                        }
                    }
                    _ => {
                        tracing::debug!(
                            state,
                            rule = ?self.grammar.rules[p - 1].tag,
                            nonterminal = self.names[self.productions[p].lhs],
                            "shift/reduce conflict without precedence, shifting"
                        );
                        Action::Shift(next)
                    }
                }
            }
            Some(Action::Reduce(q)) => {
                tracing::debug!(
                    state,
                    first = ?self.grammar.rules[q.min(p) - 1].tag,
                    second = ?self.grammar.rules[q.max(p) - 1].tag,
                    "reduce/reduce conflict, keeping the earlier rule"
                );
                Action::Reduce(q.min(p))
            }
            Some(other) => other,
        };
        row.insert(t, resolved);
    }
}

/// Compiled parse tables.
pub struct Automaton<T, P> {
    terminals: HashMap<T, usize>,
    eof: usize,
    action: Vec<HashMap<usize, Action>>,
    goto: Vec<HashMap<usize, usize>>,
    /// `(lhs, rhs length, tag)` per production.
    productions: Vec<(usize, usize, Option<P>)>,
}

impl<T, P> Automaton<T, P>
where
    T: Copy + Eq + Hash + Debug,
    P: Copy + Debug,
{
    pub fn state_count(&self) -> usize {
        self.action.len()
    }

    /// Run the tables over `tokens`. `end` is the offset reported for errors at
    /// end of input.
    pub fn parse<I, E, R>(
        &self,
        tokens: I,
        end: usize,
        reducer: &mut R,
    ) -> Result<R::Value, DriveError<E>>
    where
        I: IntoIterator<Item = Result<Lexeme<T>, E>>,
        R: Reducer<T, P>,
    {
        let mut tokens = tokens.into_iter();
        let mut states: Vec<usize> = vec![0];
        let mut values: Vec<R::Value> = Vec::new();
        let mut lookahead = tokens.next().transpose().map_err(DriveError::Lex)?;

        loop {
            let state = states.last().copied().unwrap_or(0);
            let terminal = match &lookahead {
                Some(lexeme) => match self.terminals.get(&lexeme.kind) {
                    Some(&t) => t,
                    None => {
                        return Err(DriveError::UnknownToken {
                            text: lexeme.text.clone(),
                            offset: lexeme.offset,
                        });
                    }
                },
                None => self.eof,
            };

            match self.action[state].get(&terminal).copied() {
                Some(Action::Shift(next)) => {
                    let Some(lexeme) = lookahead.take() else {
                        return Err(DriveError::Syntax {
                            text: String::new(),
                            offset: end,
                        });
                    };
                    values.push(reducer.shift(lexeme));
                    states.push(next);
                    lookahead = tokens.next().transpose().map_err(DriveError::Lex)?;
                }
                Some(Action::Reduce(p)) => {
                    let (lhs, len, tag) = self.productions[p];
                    let args = values.split_off(values.len() - len);
                    states.truncate(states.len() - len);
                    let top = states.last().copied().unwrap_or(0);
                    let (Some(tag), Some(&next)) = (tag, self.goto[top].get(&lhs)) else {
                        let (text, offset) = position(&lookahead, end);
                        return Err(DriveError::Syntax { text, offset });
                    };
                    values.push(reducer.reduce(tag, args));
                    states.push(next);
                }
                Some(Action::Accept) => {
                    return values.pop().ok_or(DriveError::Syntax {
                        text: String::new(),
                        offset: end,
                    });
                }
                Some(Action::NonAssoc) => {
                    let (text, offset) = position(&lookahead, end);
                    return Err(DriveError::NonAssociative { text, offset });
                }
                None => {
                    let (text, offset) = position(&lookahead, end);
                    return Err(DriveError::Syntax { text, offset });
                }
            }
        }
    }
}

fn position<T>(lookahead: &Option<Lexeme<T>>, end: usize) -> (String, usize) {
    match lookahead {
        Some(lexeme) => (lexeme.text.clone(), lexeme.offset),
        None => (String::new(), end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Tok {
        Num,
        Plus,
        EqEq,
        Caret,
    }

    #[derive(Debug, Clone, Copy)]
    enum Expr {
        Add,
        Equals,
        Pow,
        Literal,
    }

    struct Eval;

    impl Reducer<Tok, Expr> for Eval {
        type Value = i64;

        fn shift(&mut self, lexeme: Lexeme<Tok>) -> i64 {
            lexeme.text.parse().unwrap_or(0)
        }

        fn reduce(&mut self, production: Expr, values: Vec<i64>) -> i64 {
            match production {
                Expr::Add => values[0] + values[2],
                Expr::Equals => (values[0] == values[2]) as i64,
                Expr::Pow => values[0].pow(values[2] as u32),
                Expr::Literal => values[0],
            }
        }
    }

    fn automaton() -> Automaton<Tok, Expr> {
        use Symbol::{N, T};
        let mut g = Grammar::new();
        g.nonassoc(&[Tok::EqEq])
            .left(&[Tok::Plus])
            .right(&[Tok::Caret])
            .rule("E", &[N("E"), T(Tok::Plus), N("E")], Expr::Add)
            .rule("E", &[N("E"), T(Tok::EqEq), N("E")], Expr::Equals)
            .rule("E", &[N("E"), T(Tok::Caret), N("E")], Expr::Pow)
            .rule("E", &[T(Tok::Num)], Expr::Literal);
        g.build("E").unwrap()
    }

    fn lex(input: &str) -> Vec<Result<Lexeme<Tok>, Infallible>> {
        let mut offset = 0;
        input
            .split(' ')
            .map(|word| {
                let kind = match word {
                    "+" => Tok::Plus,
                    "==" => Tok::EqEq,
                    "^" => Tok::Caret,
                    _ => Tok::Num,
                };
                let lexeme = Lexeme {
                    kind,
                    text: word.to_string(),
                    offset,
                };
                offset += word.len() + 1;
                Ok(lexeme)
            })
            .collect()
    }

    fn eval(input: &str) -> Result<i64, DriveError<Infallible>> {
        automaton().parse(lex(input), input.len(), &mut Eval)
    }

    #[test]
    fn test_left_and_right_associativity() {
        assert_eq!(eval("1 + 2 + 3"), Ok(6));
        // 2 ^ (3 ^ 2) = 512, (2 ^ 3) ^ 2 = 64
        assert_eq!(eval("2 ^ 3 ^ 2"), Ok(512));
    }

    #[test]
    fn test_precedence_levels() {
        assert_eq!(eval("1 + 1 == 2"), Ok(1));
        assert_eq!(eval("2 == 1 + 1"), Ok(1));
    }

    #[test]
    fn test_nonassoc_chain_is_rejected() {
        assert_eq!(
            eval("1 == 1 == 1"),
            Err(DriveError::NonAssociative {
                text: "==".to_string(),
                offset: 7,
            })
        );
    }

    #[test]
    fn test_syntax_error_position() {
        assert_eq!(
            eval("1 + + 2"),
            Err(DriveError::Syntax {
                text: "+".to_string(),
                offset: 4,
            })
        );
        assert_eq!(
            eval("1 +"),
            Err(DriveError::Syntax {
                text: String::new(),
                offset: 3,
            })
        );
    }

    #[test]
    fn test_lex_error_propagates() {
        let tokens: Vec<Result<Lexeme<Tok>, &str>> = vec![Err("bad")];
        assert_eq!(
            automaton().parse(tokens, 0, &mut Eval),
            Err(DriveError::Lex("bad"))
        );
    }

    #[test]
    fn test_automaton_is_reusable() {
        let automaton = automaton();
        for _ in 0..3 {
            assert_eq!(automaton.parse(lex("4 + 5"), 5, &mut Eval), Ok(9));
        }
        assert!(automaton.state_count() > 1);
    }

    #[test]
    fn test_undefined_symbols() {
        let mut g: Grammar<Tok, Expr> = Grammar::new();
        g.rule("E", &[Symbol::N("F")], Expr::Literal);
        assert_eq!(g.build("E").err(), Some(GrammarError::UndefinedSymbol("F")));
        assert_eq!(g.build("S").err(), Some(GrammarError::UndefinedStart("S")));
    }
}
